//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for exchange feeds and reference data.
pub mod ports;

/// Market state, engine facade, bootstrap and FX refresh.
pub mod services;
