//! REST Reference Data
//!
//! Implements `MarketDataSource` over the exchanges' public HTTP APIs.

mod client;
mod types;

pub use client::{
    BINANCE_REST_URL, DEFAULT_HTTP_TIMEOUT, ExchangeRestClient, FX_REST_URL, KRW_USD_CODE,
    RestConfig, RestError, UPBIT_REST_URL,
};
pub use types::{BinanceTicker24h, ForexQuote, UpbitMarket};
