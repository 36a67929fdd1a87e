//! Port Interfaces
//!
//! Contracts between the engine and the outside world.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MarketDataSource`: REST snapshots and the FX rate, fetched before
//!   streaming starts and periodically afterwards
//! - `FeedConnection`: one persistent streaming connection per exchange
//!
//! ## Driver Ports (Inbound)
//!
//! - `MarketSink`: where exchange connections deliver published ticker
//!   snapshots and trades

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::subscription::{SubscriptionError, SubscriptionSpec};
use crate::domain::ticker::{
    AssetMetadata, Exchange, FxRate, Symbol, TickerRecord, TickerSnapshot, TradeRecord,
};

// =============================================================================
// Market Sink
// =============================================================================

/// Receives the output of the exchange connections.
///
/// Every call replaces a whole value; implementations must not hold on to
/// caller state.
pub trait MarketSink: Send + Sync {
    /// Currently published snapshot for an exchange.
    fn ticker_snapshot(&self, exchange: Exchange) -> TickerSnapshot;

    /// Replace the published snapshot for an exchange.
    fn set_ticker_snapshot(&self, exchange: Exchange, snapshot: TickerSnapshot);

    /// Deliver a trade as soon as it arrives.
    fn publish_trade(&self, trade: TradeRecord);
}

// =============================================================================
// Market Data Source
// =============================================================================

/// Failure fetching reference data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketDataError {
    /// The request could not be sent or the connection failed.
    #[error("market data request failed: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// The provider answered with a non-success status.
    #[error("market data provider returned status {status} for {endpoint}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested endpoint.
        endpoint: String,
    },

    /// The response body could not be interpreted.
    #[error("market data response invalid: {message}")]
    InvalidResponse {
        /// Error details.
        message: String,
    },
}

/// Reference data needed before and alongside streaming.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Primary exchange market listing.
    async fn fetch_markets(&self) -> Result<Vec<AssetMetadata>, MarketDataError>;

    /// Primary exchange ticker snapshot for the given markets.
    async fn fetch_primary_tickers(
        &self,
        symbols: &[Symbol],
    ) -> Result<Vec<TickerRecord>, MarketDataError>;

    /// Counterpart exchange 24h ticker snapshot for every listed market.
    async fn fetch_counterpart_tickers(&self) -> Result<Vec<TickerRecord>, MarketDataError>;

    /// Latest KRW per USD rate.
    async fn fetch_fx_rate(&self) -> Result<FxRate, MarketDataError>;
}

// =============================================================================
// Feed Connection
// =============================================================================

/// Lifecycle of a streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No subscription recorded; nothing scheduled.
    #[default]
    Disconnected,
    /// Socket handshake in progress.
    Connecting,
    /// Socket open and subscription sent.
    Connected,
    /// Socket closed; a reconnect is scheduled.
    AwaitingReconnect,
}

/// Point-in-time view of a connection, for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    /// Exchange served by the connection.
    pub exchange: Exchange,
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Decoded frames received since start.
    pub messages_received: u64,
    /// Frames dropped as malformed since start.
    pub malformed_messages: u64,
    /// Reconnects scheduled since start.
    pub reconnects: u64,
}

impl FeedStatus {
    /// Returns true if the connection is open and subscribed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Errors returned synchronously by [`FeedConnection::connect`].
///
/// Transport failures are never reported here; they are recovered by
/// reconnecting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The subscription specification is unusable.
    #[error("invalid subscription: {0}")]
    InvalidSubscription(#[from] SubscriptionError),
}

/// A persistent, self-healing streaming connection to one exchange.
pub trait FeedConnection: Send + Sync {
    /// Exchange served by the connection.
    fn exchange(&self) -> Exchange;

    /// Validate `spec`, replace any running session and start streaming.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidSubscription`] if the spec is
    /// rejected; the previous session is left untouched in that case.
    fn connect(&self, spec: SubscriptionSpec) -> Result<(), ConnectionError>;

    /// Switch the trade channel without dropping the ticker subscription.
    fn change_trade_subscription(&self, symbols: Vec<Symbol>);

    /// Close the socket, stop all timers and forget the subscription.
    fn disconnect(&self);

    /// Current status.
    fn status(&self) -> FeedStatus;

    /// Returns true if the connection is open and subscribed.
    fn is_ready(&self) -> bool {
        self.status().is_ready()
    }
}
