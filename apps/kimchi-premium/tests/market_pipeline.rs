//! End-to-end market pipeline: two local exchange streams feeding the store,
//! correlation against the FX rate, then ranking.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{Script, TestServer, binance_ticker, eventually, fast_config, spawn_server, upbit_ticker};
use kimchi_premium::{
    AssetMetadata, BinanceConnection, ConnectionState, Correlator, Exchange,
    FxRate, MarketEngine, MarketSink, MarketStore, SortDirection, SortKey, SubscriptionSpec,
    SymbolMapper, UpbitConnection,
};
use rust_decimal_macros::dec;
use tokio::time::sleep;

struct Pipeline {
    engine: MarketEngine,
    store: Arc<MarketStore>,
    _upbit: TestServer,
    _binance: TestServer,
}

fn metadata(symbol: &str, korean: &str, english: &str) -> AssetMetadata {
    AssetMetadata {
        symbol: symbol.to_string(),
        korean_name: korean.to_string(),
        english_name: english.to_string(),
    }
}

async fn start_pipeline() -> Pipeline {
    let upbit = spawn_server(Script::text(&[
        upbit_ticker("KRW-BTC", "100000000", "500"),
        upbit_ticker("KRW-ETH", "5040000", "900"),
        upbit_ticker("KRW-XRP", "700", "100"),
    ]))
    .await;
    let binance = spawn_server(Script::text(&[
        r#"{"result":null,"id":1}"#.to_string(),
        binance_ticker("BTCUSDT", "70000", "1000"),
        binance_ticker("ETHUSDT", "3500", "2000"),
    ]))
    .await;

    let store = Arc::new(MarketStore::new(Correlator::new(SymbolMapper::default())));
    store.set_asset_metadata([
        metadata("KRW-BTC", "비트코인", "Bitcoin"),
        metadata("KRW-ETH", "이더리움", "Ethereum"),
        metadata("KRW-XRP", "리플", "Ripple"),
    ]);
    store.set_fx_rate(FxRate::new(dec!(1400), Utc::now()));

    let sink: Arc<dyn MarketSink> = Arc::clone(&store) as Arc<dyn MarketSink>;
    let engine = MarketEngine::new(
        Arc::clone(&store),
        Arc::new(UpbitConnection::upbit(fast_config(&upbit.url), Arc::clone(&sink))),
        Arc::new(BinanceConnection::binance(fast_config(&binance.url), sink)),
    );

    engine
        .start(
            SubscriptionSpec::tickers(
                ["KRW-BTC", "KRW-ETH", "KRW-XRP"].map(str::to_string),
            ),
            SubscriptionSpec::tickers(["BTCUSDT", "ETHUSDT"].map(str::to_string)),
        )
        .unwrap();

    Pipeline {
        engine,
        store,
        _upbit: upbit,
        _binance: binance,
    }
}

async fn settled(store: &MarketStore) -> bool {
    eventually(Duration::from_secs(3), || {
        store.ordered_symbols().len() == 3
            && store
                .records()
                .get("KRW-ETH")
                .is_some_and(|r| r.premium.is_some())
    })
    .await
}

#[tokio::test]
async fn streams_are_correlated_and_ranked() {
    let pipeline = start_pipeline().await;
    let store = &pipeline.store;
    assert!(settled(store).await);

    // Default order: 24h traded value, largest first.
    assert_eq!(
        *store.ordered_symbols(),
        vec!["KRW-ETH", "KRW-BTC", "KRW-XRP"]
    );

    let records = store.records();
    let btc = &records["KRW-BTC"];
    assert_eq!(btc.counterpart_symbol.as_deref(), Some("BTCUSDT"));
    assert_eq!(btc.counterpart_price_krw, Some(dec!(98000000)));
    assert_eq!(btc.premium, Some(dec!(2)));
    assert_eq!(btc.korean_name.as_deref(), Some("비트코인"));

    let eth = &records["KRW-ETH"];
    assert_eq!(eth.counterpart_price_krw, Some(dec!(4900000)));
    assert_eq!(eth.premium, Some(dec!(2.78)));

    let xrp = &records["KRW-XRP"];
    assert_eq!(xrp.counterpart_symbol.as_deref(), Some("XRPUSDT"));
    assert!(xrp.counterpart_price.is_none());
    assert!(xrp.premium.is_none());

    assert!(
        eventually(Duration::from_secs(2), || pipeline.engine.is_ready()).await
    );

    pipeline.engine.reset_all();
}

#[tokio::test]
async fn search_sort_and_favorites_reorder_the_list() {
    let pipeline = start_pipeline().await;
    let store = &pipeline.store;
    assert!(settled(store).await);

    let mut ordered = store.subscribe_ordered();
    ordered.mark_unchanged();

    // Same order as the default traded-value sort: nothing is published.
    pipeline.engine.set_sort_key(SortKey::Premium, SortDirection::Descending);
    assert!(!ordered.has_changed().unwrap());

    pipeline.engine.set_sort_key(SortKey::Premium, SortDirection::Ascending);
    assert!(ordered.has_changed().unwrap());
    // Markets without a premium sort last in either direction.
    assert_eq!(
        *ordered.borrow_and_update().clone(),
        vec!["KRW-BTC", "KRW-ETH", "KRW-XRP"]
    );

    pipeline.engine.set_sort_key(SortKey::Symbol, SortDirection::Ascending);
    assert!(!ordered.has_changed().unwrap());
    assert_eq!(
        *store.ordered_symbols(),
        vec!["KRW-BTC", "KRW-ETH", "KRW-XRP"]
    );

    pipeline.engine.set_favorite("KRW-XRP", true);
    assert_eq!(
        *store.ordered_symbols(),
        vec!["KRW-XRP", "KRW-BTC", "KRW-ETH"]
    );

    pipeline.engine.set_search_query("ether");
    assert_eq!(*store.ordered_symbols(), vec!["KRW-ETH"]);

    pipeline.engine.set_search_query("리플");
    assert_eq!(*store.ordered_symbols(), vec!["KRW-XRP"]);

    pipeline.engine.set_search_query("");
    assert_eq!(store.ordered_symbols().len(), 3);

    pipeline.engine.reset_all();
}

#[tokio::test]
async fn fx_update_reprices_counterparts() {
    let pipeline = start_pipeline().await;
    let store = &pipeline.store;
    assert!(settled(store).await);

    pipeline
        .engine
        .set_fx_rate(FxRate::new(dec!(1440), Utc::now()));

    let btc = store.records()["KRW-BTC"].clone();
    assert_eq!(btc.counterpart_price_krw, Some(dec!(100800000)));
    assert_eq!(btc.premium, Some(dec!(-0.8)));

    pipeline.engine.reset_all();
}

#[tokio::test]
async fn reset_all_stops_feeds_and_clears_state() {
    let pipeline = start_pipeline().await;
    let store = &pipeline.store;
    assert!(settled(store).await);

    pipeline.engine.reset_all();

    assert!(store.ordered_symbols().is_empty());
    assert!(store.records().is_empty());
    for exchange in Exchange::all() {
        assert_eq!(
            pipeline.engine.feed_status(*exchange).state,
            ConnectionState::Disconnected
        );
    }
    // Reference data survives a reset.
    assert!(store.fx_rate().is_some());

    sleep(Duration::from_millis(200)).await;
    assert!(store.records().is_empty());

    // Idempotent.
    pipeline.engine.reset_all();
    assert!(store.ordered_symbols().is_empty());
}
