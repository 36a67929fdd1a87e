//! Domain Layer - Market data types and pure market logic.
//!
//! Nothing in this layer performs I/O. Every function is a deterministic
//! transformation of its inputs, which keeps the publication and ranking
//! path free of suspension points.

/// Canonical ticker, trade, metadata and FX types.
pub mod ticker;

/// Subscription specifications for exchange streams.
pub mod subscription;

/// Cross-exchange premium computation.
pub mod correlation;

/// Search, sort and favorite pinning of the market list.
pub mod ranking;
