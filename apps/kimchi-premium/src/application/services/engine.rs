//! Market Engine
//!
//! Owns the market store together with one feed connection per exchange.
//! This is the handle the binary and the HTTP layer hold; it is created
//! explicitly and passed around, never reached through a global.

use std::sync::Arc;

use crate::application::ports::{ConnectionError, FeedConnection, FeedStatus};
use crate::domain::ranking::{SortDirection, SortKey};
use crate::domain::subscription::SubscriptionSpec;
use crate::domain::ticker::{Exchange, FxRate, Symbol, TickerSnapshot};

use super::store::MarketStore;

/// Shared market state plus the connections that feed it.
pub struct MarketEngine {
    store: Arc<MarketStore>,
    primary: Arc<dyn FeedConnection>,
    counterpart: Arc<dyn FeedConnection>,
}

impl std::fmt::Debug for MarketEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketEngine")
            .field("primary", &self.primary.status())
            .field("counterpart", &self.counterpart.status())
            .finish_non_exhaustive()
    }
}

impl MarketEngine {
    /// Create an engine from a store and the two exchange connections.
    #[must_use]
    pub fn new(
        store: Arc<MarketStore>,
        primary: Arc<dyn FeedConnection>,
        counterpart: Arc<dyn FeedConnection>,
    ) -> Self {
        Self {
            store,
            primary,
            counterpart,
        }
    }

    /// Market store.
    #[must_use]
    pub const fn store(&self) -> &Arc<MarketStore> {
        &self.store
    }

    /// Connection for an exchange.
    #[must_use]
    pub fn connection(&self, exchange: Exchange) -> &Arc<dyn FeedConnection> {
        match exchange {
            Exchange::Upbit => &self.primary,
            Exchange::Binance => &self.counterpart,
        }
    }

    /// Start streaming on both exchanges.
    ///
    /// An empty counterpart spec starts the primary stream alone; premiums
    /// stay unknown until a counterpart is connected.
    ///
    /// # Errors
    ///
    /// Returns an error if either spec is invalid. Both specs are checked
    /// before anything connects, so a rejected start leaves both feeds idle.
    pub fn start(
        &self,
        primary: SubscriptionSpec,
        counterpart: SubscriptionSpec,
    ) -> Result<(), ConnectionError> {
        primary.validate()?;
        if counterpart.ticker_symbols.is_empty() {
            tracing::warn!("No counterpart markets to stream, premiums unavailable");
            self.primary.connect(primary)?;
            tracing::info!("Market engine started without counterpart feed");
            return Ok(());
        }
        counterpart.validate()?;

        self.primary.connect(primary)?;
        self.counterpart.connect(counterpart)?;
        tracing::info!("Market engine started");
        Ok(())
    }

    /// Switch the live trade feed on the primary exchange to `symbol`.
    pub fn watch_trades(&self, symbol: impl Into<Symbol>) {
        let symbol = symbol.into();
        tracing::info!(symbol = %symbol, "Switching trade feed");
        self.store.clear_latest_trade();
        self.primary.change_trade_subscription(vec![symbol]);
    }

    /// Status of an exchange connection.
    #[must_use]
    pub fn feed_status(&self, exchange: Exchange) -> FeedStatus {
        self.connection(exchange).status()
    }

    /// Returns true if the exchange connection is open and subscribed.
    #[must_use]
    pub fn is_connected(&self, exchange: Exchange) -> bool {
        self.connection(exchange).is_ready()
    }

    /// Returns true if both exchange connections are open and subscribed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        Exchange::all().iter().all(|e| self.is_connected(*e))
    }

    /// Replace an exchange's published snapshot.
    pub fn set_ticker_snapshot(&self, exchange: Exchange, snapshot: TickerSnapshot) {
        self.store.set_ticker_snapshot(exchange, snapshot);
    }

    /// Replace the FX rate.
    pub fn set_fx_rate(&self, rate: FxRate) {
        self.store.set_fx_rate(rate);
    }

    /// Pin or unpin a market.
    pub fn set_favorite(&self, symbol: &str, favorite: bool) {
        self.store.set_favorite(symbol, favorite);
    }

    /// Replace the search query.
    pub fn set_search_query(&self, query: impl Into<String>) {
        self.store.set_search_query(query);
    }

    /// Replace the sort key and direction.
    pub fn set_sort_key(&self, sort_key: SortKey, direction: SortDirection) {
        self.store.set_sort_key(sort_key, direction);
    }

    /// Tear down both connections, then clear derived state.
    ///
    /// Connections are stopped before the store is touched, so no snapshot
    /// or trade reaches the store once this returns. Safe to call repeatedly.
    pub fn reset_all(&self) {
        self.primary.disconnect();
        self.counterpart.disconnect();

        if self.store.clear() {
            tracing::info!("Market state reset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{ConnectionState, MarketSink};
    use crate::domain::correlation::Correlator;
    use crate::domain::ticker::{ChangeDirection, StreamType, TickerRecord};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;

    #[derive(Debug, Default)]
    struct FakeFeed {
        exchange: Option<Exchange>,
        spec: Mutex<Option<SubscriptionSpec>>,
        trade_changes: Mutex<Vec<Vec<Symbol>>>,
        disconnects: Mutex<usize>,
    }

    impl FakeFeed {
        fn new(exchange: Exchange) -> Arc<Self> {
            Arc::new(Self {
                exchange: Some(exchange),
                ..Self::default()
            })
        }
    }

    impl FeedConnection for FakeFeed {
        fn exchange(&self) -> Exchange {
            self.exchange.unwrap_or(Exchange::Upbit)
        }

        fn connect(&self, spec: SubscriptionSpec) -> Result<(), ConnectionError> {
            spec.validate()?;
            *self.spec.lock() = Some(spec);
            Ok(())
        }

        fn change_trade_subscription(&self, symbols: Vec<Symbol>) {
            self.trade_changes.lock().push(symbols);
        }

        fn disconnect(&self) {
            *self.spec.lock() = None;
            *self.disconnects.lock() += 1;
        }

        fn status(&self) -> FeedStatus {
            FeedStatus {
                exchange: self.exchange(),
                state: if self.spec.lock().is_some() {
                    ConnectionState::Connected
                } else {
                    ConnectionState::Disconnected
                },
                messages_received: 0,
                malformed_messages: 0,
                reconnects: 0,
            }
        }
    }

    fn engine() -> (MarketEngine, Arc<FakeFeed>, Arc<FakeFeed>) {
        let primary = FakeFeed::new(Exchange::Upbit);
        let counterpart = FakeFeed::new(Exchange::Binance);
        let engine = MarketEngine::new(
            Arc::new(MarketStore::new(Correlator::default())),
            primary.clone(),
            counterpart.clone(),
        );
        (engine, primary, counterpart)
    }

    fn btc() -> TickerRecord {
        TickerRecord {
            exchange: Exchange::Upbit,
            symbol: "KRW-BTC".to_string(),
            trade_price: Decimal::ONE_HUNDRED,
            opening_price: Decimal::ONE_HUNDRED,
            high_price: Decimal::ONE_HUNDRED,
            low_price: Decimal::ONE_HUNDRED,
            change: ChangeDirection::Even,
            signed_change_price: Decimal::ZERO,
            signed_change_rate: Decimal::ZERO,
            acc_trade_volume_24h: Decimal::ONE,
            acc_trade_price_24h: Decimal::ONE_HUNDRED,
            highest_52_week_price: None,
            lowest_52_week_price: None,
            timestamp: 0,
            stream_type: StreamType::Snapshot,
        }
    }

    #[test]
    fn start_connects_both_feeds() {
        let (engine, _, _) = engine();
        assert!(!engine.is_ready());

        engine
            .start(
                SubscriptionSpec::tickers(["KRW-BTC".to_string()]),
                SubscriptionSpec::tickers(["BTCUSDT".to_string()]),
            )
            .unwrap();

        assert!(engine.is_ready());
        assert!(engine.is_connected(Exchange::Binance));
    }

    #[test]
    fn start_rejects_empty_primary_spec() {
        let (engine, _, counterpart) = engine();
        let result = engine.start(
            SubscriptionSpec::default(),
            SubscriptionSpec::tickers(["BTCUSDT".to_string()]),
        );
        assert!(matches!(result, Err(ConnectionError::InvalidSubscription(_))));
        assert!(counterpart.spec.lock().is_none());
    }

    #[test]
    fn start_without_counterpart_markets_streams_primary_only() {
        let (engine, primary, counterpart) = engine();

        engine
            .start(
                SubscriptionSpec::tickers(["KRW-BTC".to_string()]),
                SubscriptionSpec::default(),
            )
            .unwrap();

        assert!(primary.spec.lock().is_some());
        assert!(counterpart.spec.lock().is_none());
        assert!(engine.is_connected(Exchange::Upbit));
        assert!(!engine.is_ready());
    }

    #[test]
    fn invalid_counterpart_spec_starts_nothing() {
        let (engine, primary, counterpart) = engine();
        let result = engine.start(
            SubscriptionSpec::tickers(["KRW-BTC".to_string()]),
            SubscriptionSpec::tickers(["BTCUSDT".to_string(), " ".to_string()]),
        );

        assert!(matches!(result, Err(ConnectionError::InvalidSubscription(_))));
        assert!(primary.spec.lock().is_none());
        assert!(counterpart.spec.lock().is_none());
    }

    #[test]
    fn watch_trades_targets_primary() {
        let (engine, primary, counterpart) = engine();
        engine.watch_trades("KRW-ETH");
        assert_eq!(*primary.trade_changes.lock(), vec![vec!["KRW-ETH".to_string()]]);
        assert!(counterpart.trade_changes.lock().is_empty());
    }

    #[test]
    fn reset_all_disconnects_and_clears() {
        let (engine, primary, counterpart) = engine();
        engine.set_ticker_snapshot(
            Exchange::Upbit,
            Arc::new([("KRW-BTC".to_string(), btc())].into_iter().collect()),
        );
        assert_eq!(engine.store().ordered_symbols().len(), 1);

        engine.reset_all();
        engine.reset_all();

        assert_eq!(*primary.disconnects.lock(), 2);
        assert_eq!(*counterpart.disconnects.lock(), 2);
        assert!(engine.store().ordered_symbols().is_empty());
        assert!(engine.store().ticker_snapshot(Exchange::Upbit).is_empty());
    }
}
