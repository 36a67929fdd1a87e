//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Exchange WebSocket adapters (Upbit, Binance).
pub mod exchange;

/// REST reference data (market listing, snapshots, FX rate).
pub mod rest;

/// Configuration loading.
pub mod config;

/// Health check, metrics and market list HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing and OpenTelemetry integration.
pub mod telemetry;
