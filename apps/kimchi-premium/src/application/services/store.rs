//! Market Store
//!
//! The single owner of published market state: the latest ticker snapshot
//! per exchange, the FX rate, asset metadata, the enriched records, and the
//! ordered market list.
//!
//! Every mutation replaces whole values and reruns correlation and ranking
//! synchronously before the lock is released, so readers never observe
//! records and ordering from different cycles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::application::ports::MarketSink;
use crate::domain::correlation::{CorrelationInput, Correlator, EnrichedRecord, RecordMap};
use crate::domain::ranking::{
    FavoriteSet, OrderedSymbols, RankingCriteria, RankingEngine, SortDirection, SortKey,
};
use crate::domain::ticker::{AssetMetadata, Exchange, FxRate, Symbol, TickerSnapshot, TradeRecord};
use crate::infrastructure::metrics;

/// Default capacity of the trade fan-out channel.
pub const DEFAULT_TRADE_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct StoreState {
    primary: TickerSnapshot,
    counterpart: TickerSnapshot,
    fx_rate: Option<FxRate>,
    metadata: HashMap<Symbol, AssetMetadata>,
    records: Arc<RecordMap>,
    favorites: FavoriteSet,
    criteria: RankingCriteria,
    ranking: RankingEngine,
    latest_trade: Option<TradeRecord>,
}

/// Summary of the store for health reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSummary {
    /// Number of enriched records.
    pub records: usize,
    /// Number of markets in the ordered list.
    pub ordered: usize,
    /// Latest FX rate.
    pub fx_rate: Option<FxRate>,
}

/// Shared market state.
#[derive(Debug)]
pub struct MarketStore {
    state: Mutex<StoreState>,
    correlator: Correlator,
    ordered_tx: watch::Sender<OrderedSymbols>,
    trade_tx: broadcast::Sender<TradeRecord>,
}

impl MarketStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(correlator: Correlator) -> Self {
        Self::with_trade_capacity(correlator, DEFAULT_TRADE_CAPACITY)
    }

    /// Create an empty store with a custom trade channel capacity.
    #[must_use]
    pub fn with_trade_capacity(correlator: Correlator, trade_capacity: usize) -> Self {
        let (ordered_tx, _) = watch::channel(OrderedSymbols::default());
        let (trade_tx, _) = broadcast::channel(trade_capacity.max(1));

        Self {
            state: Mutex::new(StoreState::default()),
            correlator,
            ordered_tx,
            trade_tx,
        }
    }

    /// Correlator in use.
    #[must_use]
    pub const fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    // -------------------------------------------------------------------------
    // Readers
    // -------------------------------------------------------------------------

    /// Latest FX rate.
    #[must_use]
    pub fn fx_rate(&self) -> Option<FxRate> {
        self.state.lock().fx_rate
    }

    /// Enriched records keyed by primary market code.
    #[must_use]
    pub fn records(&self) -> Arc<RecordMap> {
        Arc::clone(&self.state.lock().records)
    }

    /// Current ordered market list.
    #[must_use]
    pub fn ordered_symbols(&self) -> OrderedSymbols {
        self.state.lock().ranking.current()
    }

    /// Enriched records in list order, taken from the same cycle.
    #[must_use]
    pub fn ordered_records(&self) -> Vec<EnrichedRecord> {
        let state = self.state.lock();
        state
            .ranking
            .current()
            .iter()
            .filter_map(|symbol| state.records.get(symbol).cloned())
            .collect()
    }

    /// Active search and sort criteria.
    #[must_use]
    pub fn criteria(&self) -> RankingCriteria {
        self.state.lock().criteria.clone()
    }

    /// Most recent trade on the watched market.
    #[must_use]
    pub fn latest_trade(&self) -> Option<TradeRecord> {
        self.state.lock().latest_trade.clone()
    }

    /// Counts and FX rate for health reporting.
    #[must_use]
    pub fn summary(&self) -> StoreSummary {
        let state = self.state.lock();
        StoreSummary {
            records: state.records.len(),
            ordered: state.ranking.current().len(),
            fx_rate: state.fx_rate,
        }
    }

    /// Observe ordered-list changes. Fires only when the list changes.
    #[must_use]
    pub fn subscribe_ordered(&self) -> watch::Receiver<OrderedSymbols> {
        self.ordered_tx.subscribe()
    }

    /// Observe trades as they arrive. Slow receivers skip ahead.
    #[must_use]
    pub fn subscribe_trades(&self) -> broadcast::Receiver<TradeRecord> {
        self.trade_tx.subscribe()
    }

    // -------------------------------------------------------------------------
    // Mutators
    // -------------------------------------------------------------------------

    /// Replace an exchange's published ticker snapshot.
    pub fn set_ticker_snapshot(&self, exchange: Exchange, snapshot: TickerSnapshot) {
        let mut state = self.state.lock();
        match exchange {
            Exchange::Upbit => state.primary = snapshot,
            Exchange::Binance => state.counterpart = snapshot,
        }
        self.recompute(&mut state);
    }

    /// Replace the FX rate.
    pub fn set_fx_rate(&self, rate: FxRate) {
        metrics::set_fx_rate(rate.base_price);
        let mut state = self.state.lock();
        state.fx_rate = Some(rate);
        self.recompute(&mut state);
    }

    /// Replace the asset metadata table.
    pub fn set_asset_metadata(&self, metadata: impl IntoIterator<Item = AssetMetadata>) {
        let mut state = self.state.lock();
        state.metadata = metadata
            .into_iter()
            .map(|m| (m.symbol.clone(), m))
            .collect();
        self.recompute(&mut state);
    }

    /// Pin or unpin a market.
    pub fn set_favorite(&self, symbol: &str, favorite: bool) {
        let mut state = self.state.lock();
        if state.favorites.set(symbol, favorite) {
            self.rerank(&mut state);
        }
    }

    /// Replace the favorite set.
    pub fn set_favorites(&self, favorites: FavoriteSet) {
        let mut state = self.state.lock();
        if state.favorites != favorites {
            state.favorites = favorites;
            self.rerank(&mut state);
        }
    }

    /// Replace the search query.
    pub fn set_search_query(&self, query: impl Into<String>) {
        let query = query.into();
        let mut state = self.state.lock();
        if state.criteria.query != query {
            state.criteria.query = query;
            self.rerank(&mut state);
        }
    }

    /// Replace the sort key and direction.
    pub fn set_sort_key(&self, sort_key: SortKey, direction: SortDirection) {
        let mut state = self.state.lock();
        if state.criteria.sort_key != sort_key || state.criteria.direction != direction {
            state.criteria.sort_key = sort_key;
            state.criteria.direction = direction;
            self.rerank(&mut state);
        }
    }

    /// Forget the latest trade, for example when switching markets.
    pub fn clear_latest_trade(&self) {
        self.state.lock().latest_trade = None;
    }

    /// Drop snapshots, records, the latest trade and the ordered list.
    ///
    /// Metadata, favorites, criteria and the FX rate survive. Returns true if
    /// the ordered list was non-empty.
    pub fn clear(&self) -> bool {
        let mut state = self.state.lock();
        state.primary = TickerSnapshot::default();
        state.counterpart = TickerSnapshot::default();
        state.records = Arc::default();
        state.latest_trade = None;
        metrics::set_record_count(0);

        let emptied = state.ranking.reset();
        if emptied {
            self.ordered_tx.send_replace(state.ranking.current());
        }
        emptied
    }

    // -------------------------------------------------------------------------
    // Cycle
    // -------------------------------------------------------------------------

    fn recompute(&self, state: &mut StoreState) {
        let started = Instant::now();

        let records = self.correlator.correlate(CorrelationInput {
            primary: &state.primary,
            counterpart: &state.counterpart,
            fx_rate: state.fx_rate.as_ref(),
            metadata: &state.metadata,
        });
        metrics::set_record_count(records.len());
        state.records = Arc::new(records);
        self.rerank(state);

        metrics::record_cycle_duration(started.elapsed());
    }

    fn rerank(&self, state: &mut StoreState) {
        if let Some(list) = state
            .ranking
            .rank(&state.records, &state.criteria, &state.favorites)
        {
            tracing::trace!(markets = list.len(), "Ordered market list changed");
            metrics::record_ranking_update();
            self.ordered_tx.send_replace(list);
        }
    }
}

impl MarketSink for MarketStore {
    fn ticker_snapshot(&self, exchange: Exchange) -> TickerSnapshot {
        let state = self.state.lock();
        match exchange {
            Exchange::Upbit => Arc::clone(&state.primary),
            Exchange::Binance => Arc::clone(&state.counterpart),
        }
    }

    fn set_ticker_snapshot(&self, exchange: Exchange, snapshot: TickerSnapshot) {
        Self::set_ticker_snapshot(self, exchange, snapshot);
    }

    fn publish_trade(&self, trade: TradeRecord) {
        self.state.lock().latest_trade = Some(trade.clone());
        // No receivers is fine; the latest trade is still held.
        let _ = self.trade_tx.send(trade);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ticker::{AskBid, ChangeDirection, StreamType, TickerRecord};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn ticker(exchange: Exchange, symbol: &str, price: Decimal) -> TickerRecord {
        TickerRecord {
            exchange,
            symbol: symbol.to_string(),
            trade_price: price,
            opening_price: price,
            high_price: price,
            low_price: price,
            change: ChangeDirection::Even,
            signed_change_price: Decimal::ZERO,
            signed_change_rate: Decimal::ZERO,
            acc_trade_volume_24h: Decimal::ONE,
            acc_trade_price_24h: price,
            highest_52_week_price: None,
            lowest_52_week_price: None,
            timestamp: 0,
            stream_type: StreamType::Realtime,
        }
    }

    fn snapshot(records: Vec<TickerRecord>) -> TickerSnapshot {
        Arc::new(records.into_iter().map(|r| (r.symbol.clone(), r)).collect())
    }

    fn seeded_store() -> MarketStore {
        let store = MarketStore::new(Correlator::default());
        store.set_ticker_snapshot(
            Exchange::Upbit,
            snapshot(vec![
                ticker(Exchange::Upbit, "KRW-BTC", dec!(100000)),
                ticker(Exchange::Upbit, "KRW-ETH", dec!(5000)),
            ]),
        );
        store
    }

    #[test]
    fn publication_recomputes_records_and_order() {
        let store = seeded_store();
        assert_eq!(store.records().len(), 2);
        assert_eq!(*store.ordered_symbols(), vec!["KRW-BTC", "KRW-ETH"]);
        assert_eq!(store.records()["KRW-BTC"].premium, None);

        store.set_ticker_snapshot(
            Exchange::Binance,
            snapshot(vec![ticker(Exchange::Binance, "BTCUSDT", dec!(70))]),
        );
        store.set_fx_rate(FxRate::new(dec!(1400), Utc::now()));

        assert_eq!(store.records()["KRW-BTC"].premium, Some(dec!(2.00)));
        assert_eq!(store.records()["KRW-ETH"].premium, None);
    }

    #[test]
    fn ordered_watch_fires_only_on_change() {
        let store = seeded_store();
        let mut rx = store.subscribe_ordered();
        rx.mark_unchanged();

        store.set_fx_rate(FxRate::new(dec!(1400), Utc::now()));
        assert!(!rx.has_changed().unwrap());

        store.set_favorite("KRW-ETH", true);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update().clone(), vec!["KRW-ETH", "KRW-BTC"]);
    }

    #[test]
    fn search_and_sort_rerank() {
        let store = seeded_store();
        store.set_search_query("eth");
        assert_eq!(*store.ordered_symbols(), vec!["KRW-ETH"]);

        store.set_search_query("");
        store.set_sort_key(SortKey::TradePrice, SortDirection::Ascending);
        assert_eq!(*store.ordered_symbols(), vec!["KRW-ETH", "KRW-BTC"]);
        assert_eq!(store.criteria().sort_key, SortKey::TradePrice);
    }

    #[test]
    fn metadata_joins_names() {
        let store = seeded_store();
        store.set_asset_metadata([AssetMetadata {
            symbol: "KRW-BTC".to_string(),
            korean_name: "비트코인".to_string(),
            english_name: "Bitcoin".to_string(),
        }]);
        store.set_search_query("bitcoin");
        assert_eq!(*store.ordered_symbols(), vec!["KRW-BTC"]);
        assert_eq!(store.ordered_records()[0].english_name.as_deref(), Some("Bitcoin"));
    }

    #[test]
    fn clear_is_idempotent() {
        let store = seeded_store();
        store.set_fx_rate(FxRate::new(dec!(1400), Utc::now()));

        assert!(store.clear());
        assert!(!store.clear());
        assert!(store.records().is_empty());
        assert!(store.ordered_symbols().is_empty());
        assert!(store.fx_rate().is_some());
        assert!(store.ticker_snapshot(Exchange::Upbit).is_empty());
    }

    #[tokio::test]
    async fn trades_are_held_and_fanned_out() {
        let store = MarketStore::new(Correlator::default());
        let mut rx = store.subscribe_trades();

        let trade = TradeRecord {
            exchange: Exchange::Upbit,
            symbol: "KRW-BTC".to_string(),
            trade_price: dec!(100000),
            trade_volume: dec!(0.1),
            ask_bid: AskBid::Ask,
            timestamp: 1,
            sequential_id: Some(7),
        };
        store.publish_trade(trade.clone());

        assert_eq!(rx.recv().await.unwrap(), trade);
        assert_eq!(store.latest_trade(), Some(trade));

        store.clear_latest_trade();
        assert_eq!(store.latest_trade(), None);
    }

    #[test]
    fn summary_counts() {
        let store = seeded_store();
        let summary = store.summary();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.ordered, 2);
        assert_eq!(summary.fx_rate, None);
    }
}
