//! REST Response Types
//!
//! Wire shapes of the reference-data endpoints.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::ticker::{AssetMetadata, ChangeDirection, Exchange, StreamType, TickerRecord};
use crate::infrastructure::exchange::codec::percent_to_rate;

/// Entry of `GET /v1/market/all`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpbitMarket {
    /// Market code (`KRW-BTC`).
    pub market: String,
    /// Korean display name.
    pub korean_name: String,
    /// English display name.
    pub english_name: String,
}

impl From<UpbitMarket> for AssetMetadata {
    fn from(market: UpbitMarket) -> Self {
        Self {
            symbol: market.market,
            korean_name: market.korean_name,
            english_name: market.english_name,
        }
    }
}

/// Entry of Binance `GET /api/v3/ticker/24hr`.
///
/// Decimal fields arrive as strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceTicker24h {
    /// Symbol (`BTCUSDT`).
    pub symbol: String,
    /// Absolute 24h change.
    pub price_change: Decimal,
    /// 24h change in percent.
    pub price_change_percent: Decimal,
    /// Last price.
    pub last_price: Decimal,
    /// Open price.
    pub open_price: Decimal,
    /// 24h high.
    pub high_price: Decimal,
    /// 24h low.
    pub low_price: Decimal,
    /// Base asset volume.
    pub volume: Decimal,
    /// Quote asset volume.
    pub quote_volume: Decimal,
    /// Window close time (ms).
    pub close_time: i64,
}

impl From<BinanceTicker24h> for TickerRecord {
    fn from(ticker: BinanceTicker24h) -> Self {
        Self {
            exchange: Exchange::Binance,
            symbol: ticker.symbol,
            trade_price: ticker.last_price,
            opening_price: ticker.open_price,
            high_price: ticker.high_price,
            low_price: ticker.low_price,
            change: ChangeDirection::from_signed(ticker.price_change),
            signed_change_price: ticker.price_change,
            signed_change_rate: percent_to_rate(ticker.price_change_percent),
            acc_trade_volume_24h: ticker.volume,
            acc_trade_price_24h: ticker.quote_volume,
            highest_52_week_price: None,
            lowest_52_week_price: None,
            timestamp: ticker.close_time,
            stream_type: StreamType::Snapshot,
        }
    }
}

/// Entry of `GET /v1/forex/recent`. Only the fields the engine uses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForexQuote {
    /// Rate code (`FRX.KRWUSD`).
    pub code: String,
    /// KRW per unit of the quoted currency.
    pub base_price: Decimal,
    /// Observation time (ms).
    pub timestamp: i64,
}
