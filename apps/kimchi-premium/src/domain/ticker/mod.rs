//! Market Data Types
//!
//! Canonical, exchange-neutral representations of tickers, trades, asset
//! metadata and the KRW/USD rate. Exchange wire formats are normalized into
//! these types at the codec boundary and never leak past it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// A market code as the owning exchange spells it (`KRW-BTC`, `BTCUSDT`).
pub type Symbol = String;

/// Prefix of KRW-quoted markets on the primary exchange.
pub const KRW_MARKET_PREFIX: &str = "KRW-";

/// Returns true if `symbol` is a KRW-quoted primary market code.
#[must_use]
pub fn is_krw_quoted(symbol: &str) -> bool {
    symbol
        .get(..KRW_MARKET_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(KRW_MARKET_PREFIX))
}

/// Exchanges tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    /// Primary exchange, KRW-quoted markets.
    Upbit,
    /// Counterpart exchange, USDT-quoted markets.
    Binance,
}

impl Exchange {
    /// All tracked exchanges.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Upbit, Self::Binance]
    }

    /// Lowercase exchange name, used as a metrics label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upbit => "upbit",
            Self::Binance => "binance",
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Ticker
// =============================================================================

/// Direction of the 24h price change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeDirection {
    /// Price is above the previous close.
    Rise,
    /// Price is unchanged.
    #[default]
    Even,
    /// Price is below the previous close.
    Fall,
}

impl ChangeDirection {
    /// Derive the direction from a signed change amount.
    #[must_use]
    pub fn from_signed(change: Decimal) -> Self {
        match change.cmp(&Decimal::ZERO) {
            std::cmp::Ordering::Greater => Self::Rise,
            std::cmp::Ordering::Equal => Self::Even,
            std::cmp::Ordering::Less => Self::Fall,
        }
    }
}

/// Whether a record came from a point-in-time snapshot or the live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamType {
    /// Seeded from a REST snapshot or a stream snapshot frame.
    Snapshot,
    /// Received from the live stream.
    #[default]
    Realtime,
}

/// Latest known ticker for one (exchange, symbol).
///
/// Records are immutable once published; every update replaces the whole
/// record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerRecord {
    /// Exchange that produced the record.
    pub exchange: Exchange,
    /// Market code on that exchange.
    pub symbol: Symbol,
    /// Last trade price in the market's quote currency.
    pub trade_price: Decimal,
    /// Opening price of the current 24h window.
    pub opening_price: Decimal,
    /// 24h high.
    pub high_price: Decimal,
    /// 24h low.
    pub low_price: Decimal,
    /// Change direction relative to the previous close.
    pub change: ChangeDirection,
    /// Signed change amount relative to the previous close.
    pub signed_change_price: Decimal,
    /// Signed change rate as a fraction (0.01 = 1%).
    pub signed_change_rate: Decimal,
    /// Base-asset volume traded in the last 24h.
    pub acc_trade_volume_24h: Decimal,
    /// Quote-currency value traded in the last 24h.
    pub acc_trade_price_24h: Decimal,
    /// 52-week high, when the exchange reports it.
    pub highest_52_week_price: Option<Decimal>,
    /// 52-week low, when the exchange reports it.
    pub lowest_52_week_price: Option<Decimal>,
    /// Exchange timestamp in milliseconds since the epoch.
    pub timestamp: i64,
    /// Snapshot or real-time origin.
    pub stream_type: StreamType,
}

/// Immutable per-exchange ticker map, shared between publisher and readers.
pub type TickerSnapshot = Arc<HashMap<Symbol, TickerRecord>>;

// =============================================================================
// Trade
// =============================================================================

/// Taker side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AskBid {
    /// Seller-initiated.
    Ask,
    /// Buyer-initiated.
    Bid,
}

/// A single executed trade on the watched market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Exchange that produced the trade.
    pub exchange: Exchange,
    /// Market code on that exchange.
    pub symbol: Symbol,
    /// Execution price.
    pub trade_price: Decimal,
    /// Executed quantity.
    pub trade_volume: Decimal,
    /// Taker side.
    pub ask_bid: AskBid,
    /// Execution time in milliseconds since the epoch.
    pub timestamp: i64,
    /// Exchange-assigned trade sequence, when present.
    pub sequential_id: Option<u64>,
}

// =============================================================================
// Stream Message
// =============================================================================

/// A decoded market data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// Ticker update, coalesced through the update buffer.
    Ticker(TickerRecord),
    /// Trade event, published immediately.
    Trade(TradeRecord),
}

impl StreamMessage {
    /// Label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ticker(_) => "ticker",
            Self::Trade(_) => "trade",
        }
    }
}

// =============================================================================
// Metadata and FX
// =============================================================================

/// Display names for a primary market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Primary market code (`KRW-BTC`).
    pub symbol: Symbol,
    /// Korean display name.
    pub korean_name: String,
    /// English display name.
    pub english_name: String,
}

impl AssetMetadata {
    /// Returns true if this is a KRW-quoted market.
    #[must_use]
    pub fn is_krw_quoted(&self) -> bool {
        is_krw_quoted(&self.symbol)
    }
}

/// KRW value of one USD, with the time it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxRate {
    /// KRW per USD.
    pub base_price: Decimal,
    /// Observation time reported by the rate provider.
    pub observed_at: DateTime<Utc>,
}

impl FxRate {
    /// Create a rate observed at `observed_at`.
    #[must_use]
    pub const fn new(base_price: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            base_price,
            observed_at,
        }
    }

    /// Age of the observation relative to `now`, saturating at zero.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.observed_at).max(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn krw_prefix_detection() {
        assert!(is_krw_quoted("KRW-BTC"));
        assert!(is_krw_quoted("krw-eth"));
        assert!(!is_krw_quoted("BTC-ETH"));
        assert!(!is_krw_quoted("USDT-BTC"));
        assert!(!is_krw_quoted("KRW"));
    }

    #[test]
    fn change_direction_from_sign() {
        assert_eq!(ChangeDirection::from_signed(dec!(12.5)), ChangeDirection::Rise);
        assert_eq!(ChangeDirection::from_signed(dec!(0)), ChangeDirection::Even);
        assert_eq!(ChangeDirection::from_signed(dec!(-3)), ChangeDirection::Fall);
    }

    #[test]
    fn exchange_labels() {
        assert_eq!(Exchange::Upbit.as_str(), "upbit");
        assert_eq!(Exchange::Binance.to_string(), "binance");
        assert_eq!(Exchange::all().len(), 2);
    }

    #[test]
    fn fx_age_never_negative() {
        let now = Utc::now();
        let future = FxRate::new(dec!(1400), now + chrono::Duration::seconds(30));
        assert_eq!(future.age(now), chrono::Duration::zero());

        let past = FxRate::new(dec!(1400), now - chrono::Duration::seconds(90));
        assert_eq!(past.age(now).num_seconds(), 90);
    }

    #[test]
    fn stream_message_kind() {
        let trade = TradeRecord {
            exchange: Exchange::Upbit,
            symbol: "KRW-BTC".to_string(),
            trade_price: dec!(100),
            trade_volume: dec!(1),
            ask_bid: AskBid::Bid,
            timestamp: 0,
            sequential_id: None,
        };
        assert_eq!(StreamMessage::Trade(trade).kind(), "trade");
    }
}
