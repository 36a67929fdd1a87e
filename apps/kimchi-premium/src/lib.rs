#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Kimchi Premium - Cross-Exchange Market Engine
//!
//! Keeps one live WebSocket subscription to Upbit (KRW markets) and one to
//! Binance (USDT markets), converts Binance prices to KRW through the
//! KRW/USD rate and publishes a searchable, sortable market list carrying
//! the premium of every Upbit market over its Binance counterpart.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: Pure market types and algorithms
//!   - `ticker`: Ticker, trade, metadata and FX types
//!   - `subscription`: Stream subscription specifications
//!   - `correlation`: Symbol mapping and premium computation
//!   - `ranking`: Search, sort and favorite pinning
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Feed connection, market sink and reference data interfaces
//!   - `services`: Market store, engine facade, bootstrap, FX refresh
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `exchange`: WebSocket connections, codecs, watchdog, buffering
//!   - `rest`: Reference data over HTTP
//!   - `config`: Environment configuration
//!   - `health`: Health, metrics and market list endpoint
//!
//! # Data Flow
//!
//! ```text
//! Upbit WS ---> UpdateBuffer --(200ms)--+
//!                                       +--> MarketStore --> Correlator --> RankingEngine --> ordered list
//! Binance WS -> UpdateBuffer --(200ms)--+        ^
//!                                                |
//! REST bootstrap / FX refresher -----------------+
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market types and pure logic with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::correlation::{Correlator, EnrichedRecord, RecordMap, SymbolMapper};
pub use domain::ranking::{FavoriteSet, OrderedSymbols, RankingCriteria, SortDirection, SortKey};
pub use domain::subscription::{MessageFormat, SubscriptionSpec};
pub use domain::ticker::{
    AssetMetadata, Exchange, FxRate, Symbol, TickerRecord, TickerSnapshot, TradeRecord,
};

// Ports and services
pub use application::ports::{
    ConnectionError, ConnectionState, FeedConnection, FeedStatus, MarketDataError,
    MarketDataSource, MarketSink,
};
pub use application::services::{
    BootstrapError, BootstrapPlan, FxRefresher, MarketEngine, MarketStore, bootstrap,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, EngineConfig, ServerSettings, StreamSettings};

// Exchange connections
pub use infrastructure::exchange::{
    BinanceConnection, ConnectionConfig, StreamConnection, UpbitConnection,
};

// REST client
pub use infrastructure::rest::{ExchangeRestClient, RestConfig, RestError};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
