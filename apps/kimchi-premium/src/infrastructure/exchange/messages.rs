//! Exchange WebSocket Message Types
//!
//! Wire format types for the Upbit and Binance market data streams. These
//! map directly to the exchanges' JSON schemas and are converted into the
//! canonical domain types by the codecs.
//!
//! # Upbit
//!
//! - Subscription: a JSON array of directives (ticket, channel, format)
//! - `ticker` / `trade` frames, in SIMPLE (`ty`, `cd`, `tp`) or DEFAULT
//!   (`type`, `code`, `trade_price`) field naming
//! - `{"status":"UP"}` keep-alive answers
//!
//! # Binance
//!
//! - Subscription: `{"method":"SUBSCRIBE","params":[..],"id":n}`
//! - Combined stream frames: `{"stream":"btcusdt@ticker","data":{..}}`
//! - Request acks: `{"result":null,"id":n}`
//!
//! # References
//!
//! - [Upbit WebSocket](https://docs.upbit.com/reference/websocket-ticker)
//! - [Binance WebSocket Streams](https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::ticker::{AskBid, ChangeDirection, StreamType};

// =============================================================================
// Upbit Subscription
// =============================================================================

/// One element of an Upbit subscription array.
///
/// # Wire Format (JSON)
/// ```json
/// [{"ticket":"6f1c..."},
///  {"type":"ticker","codes":["KRW-BTC"],"isOnlyRealtime":true},
///  {"type":"trade","codes":["KRW-BTC"],"isOnlyRealtime":true},
///  {"format":"SIMPLE"}]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UpbitDirective {
    /// Unique request ticket.
    Ticket {
        /// Ticket value.
        ticket: String,
    },
    /// Channel subscription.
    Channel {
        /// Channel name: `ticker` or `trade`.
        #[serde(rename = "type")]
        channel: String,
        /// Upper-case market codes.
        codes: Vec<String>,
        /// Skip the initial snapshot frame.
        #[serde(rename = "isOnlyRealtime")]
        is_only_realtime: bool,
    },
    /// Response field naming.
    Format {
        /// `SIMPLE` or `DEFAULT`.
        format: String,
    },
}

impl UpbitDirective {
    /// Realtime-only channel directive.
    #[must_use]
    pub fn channel(channel: &str, codes: &[String]) -> Self {
        Self::Channel {
            channel: channel.to_string(),
            codes: codes.iter().map(|c| c.to_uppercase()).collect(),
            is_only_realtime: true,
        }
    }
}

// =============================================================================
// Upbit Stream Frames
// =============================================================================

/// Upbit ticker frame, also the shape of the REST `/v1/ticker` response.
///
/// # Wire Format (SIMPLE)
/// ```json
/// {"ty":"ticker","cd":"KRW-BTC","op":100,"hp":110,"lp":90,"tp":105,
///  "c":"RISE","scp":5,"scr":0.05,"atv24h":12.3,"atp24h":1291.5,
///  "h52wp":120,"l52wp":50,"tms":1700000000000,"st":"REALTIME"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpbitTickerMessage {
    /// Market code.
    #[serde(alias = "cd", alias = "market")]
    pub code: String,
    /// Opening price.
    #[serde(alias = "op")]
    pub opening_price: Decimal,
    /// 24h high.
    #[serde(alias = "hp")]
    pub high_price: Decimal,
    /// 24h low.
    #[serde(alias = "lp")]
    pub low_price: Decimal,
    /// Last trade price.
    #[serde(alias = "tp")]
    pub trade_price: Decimal,
    /// Change direction.
    #[serde(alias = "c")]
    pub change: ChangeDirection,
    /// Signed change amount.
    #[serde(alias = "scp")]
    pub signed_change_price: Decimal,
    /// Signed change rate.
    #[serde(alias = "scr")]
    pub signed_change_rate: Decimal,
    /// 24h volume.
    #[serde(alias = "atv24h")]
    pub acc_trade_volume_24h: Decimal,
    /// 24h traded value.
    #[serde(alias = "atp24h")]
    pub acc_trade_price_24h: Decimal,
    /// 52-week high.
    #[serde(alias = "h52wp", default)]
    pub highest_52_week_price: Option<Decimal>,
    /// 52-week low.
    #[serde(alias = "l52wp", default)]
    pub lowest_52_week_price: Option<Decimal>,
    /// Message timestamp (ms).
    #[serde(alias = "tms")]
    pub timestamp: i64,
    /// `SNAPSHOT` or `REALTIME`; absent on REST responses.
    #[serde(alias = "st", default)]
    pub stream_type: Option<StreamType>,
}

/// Upbit trade frame.
///
/// # Wire Format (SIMPLE)
/// ```json
/// {"ty":"trade","cd":"KRW-BTC","tp":105,"tv":0.01,"ab":"BID",
///  "ttms":1700000000000,"sid":17000000000000000}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpbitTradeMessage {
    /// Market code.
    #[serde(alias = "cd")]
    pub code: String,
    /// Execution price.
    #[serde(alias = "tp")]
    pub trade_price: Decimal,
    /// Executed quantity.
    #[serde(alias = "tv")]
    pub trade_volume: Decimal,
    /// Taker side.
    #[serde(alias = "ab")]
    pub ask_bid: AskBid,
    /// Execution time (ms).
    #[serde(alias = "ttms")]
    pub trade_timestamp: i64,
    /// Trade sequence number.
    #[serde(alias = "sid", default)]
    pub sequential_id: Option<u64>,
}

/// Upbit error frame.
///
/// # Wire Format (JSON)
/// ```json
/// {"error":{"name":"INVALID_PARAM","message":"..."}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpbitErrorMessage {
    /// Error details.
    pub error: UpbitErrorBody,
}

/// Body of an Upbit error frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpbitErrorBody {
    /// Error name.
    pub name: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Binance Requests
// =============================================================================

/// Binance stream control request.
///
/// # Wire Format (JSON)
/// ```json
/// {"method":"SUBSCRIBE","params":["btcusdt@ticker","btcusdt@trade"],"id":1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinanceRequest {
    /// `SUBSCRIBE` or `UNSUBSCRIBE`.
    pub method: &'static str,
    /// Stream names.
    pub params: Vec<String>,
    /// Request id, echoed in the ack.
    pub id: u64,
}

impl BinanceRequest {
    /// Subscribe request.
    #[must_use]
    pub const fn subscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: "SUBSCRIBE",
            params,
            id,
        }
    }

    /// Unsubscribe request.
    #[must_use]
    pub const fn unsubscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: "UNSUBSCRIBE",
            params,
            id,
        }
    }
}

/// Stream name for a symbol and channel, e.g. `btcusdt@ticker`.
#[must_use]
pub fn binance_stream_name(symbol: &str, channel: &str) -> String {
    format!("{}@{channel}", symbol.to_lowercase())
}

// =============================================================================
// Binance Stream Frames
// =============================================================================

/// Binance combined stream envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinanceEnvelope {
    /// Stream name.
    pub stream: String,
    /// Event payload.
    pub data: serde_json::Value,
}

/// Binance 24h rolling ticker event.
///
/// # Wire Format (JSON)
/// ```json
/// {"e":"24hrTicker","E":1700000000000,"s":"BTCUSDT","p":"150.0",
///  "P":"0.214","o":"70000","h":"71000","l":"69000","c":"70150",
///  "v":"1234.5","q":"86500000"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BinanceTickerMessage {
    /// Event time (ms).
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Price change.
    #[serde(rename = "p")]
    pub price_change: Decimal,
    /// Price change percent.
    #[serde(rename = "P")]
    pub price_change_percent: Decimal,
    /// Open price.
    #[serde(rename = "o")]
    pub open_price: Decimal,
    /// High price.
    #[serde(rename = "h")]
    pub high_price: Decimal,
    /// Low price.
    #[serde(rename = "l")]
    pub low_price: Decimal,
    /// Last price.
    #[serde(rename = "c")]
    pub last_price: Decimal,
    /// Base asset volume.
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Quote asset volume.
    #[serde(rename = "q")]
    pub quote_volume: Decimal,
}

/// Binance trade event.
///
/// # Wire Format (JSON)
/// ```json
/// {"e":"trade","E":1700000000001,"s":"BTCUSDT","t":12345,"p":"70150.1",
///  "q":"0.002","T":1700000000000,"m":true}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BinanceTradeMessage {
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Trade id.
    #[serde(rename = "t")]
    pub trade_id: u64,
    /// Price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Quantity.
    #[serde(rename = "q")]
    pub quantity: Decimal,
    /// Trade time (ms).
    #[serde(rename = "T")]
    pub trade_time: i64,
    /// Buyer is the maker, i.e. the seller took liquidity.
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn upbit_subscription_serialization() {
        let frame = vec![
            UpbitDirective::Ticket {
                ticket: "t-1".to_string(),
            },
            UpbitDirective::channel("ticker", &["krw-btc".to_string()]),
            UpbitDirective::Format {
                format: "SIMPLE".to_string(),
            },
        ];
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"[{"ticket":"t-1"},{"type":"ticker","codes":["KRW-BTC"],"isOnlyRealtime":true},{"format":"SIMPLE"}]"#
        );
    }

    #[test]
    fn upbit_ticker_simple_and_default_names() {
        let simple = r#"{"ty":"ticker","cd":"KRW-BTC","op":100,"hp":110,"lp":90,"tp":105,
            "c":"RISE","scp":5,"scr":0.05,"atv24h":12.3,"atp24h":1291.5,
            "tms":1700000000000,"st":"REALTIME"}"#;
        let default = r#"{"type":"ticker","code":"KRW-BTC","opening_price":100,"high_price":110,
            "low_price":90,"trade_price":105,"change":"RISE","signed_change_price":5,
            "signed_change_rate":0.05,"acc_trade_volume_24h":12.3,"acc_trade_price_24h":1291.5,
            "highest_52_week_price":120,"timestamp":1700000000000,"stream_type":"REALTIME"}"#;

        let a: UpbitTickerMessage = serde_json::from_str(simple).unwrap();
        let b: UpbitTickerMessage = serde_json::from_str(default).unwrap();

        assert_eq!(a.code, b.code);
        assert_eq!(a.trade_price, dec!(105));
        assert_eq!(b.signed_change_rate, dec!(0.05));
        assert_eq!(a.highest_52_week_price, None);
        assert_eq!(b.highest_52_week_price, Some(dec!(120)));
        assert_eq!(a.stream_type, Some(StreamType::Realtime));
    }

    #[test]
    fn binance_request_serialization() {
        let request = BinanceRequest::subscribe(
            vec![
                binance_stream_name("BTCUSDT", "ticker"),
                binance_stream_name("BTCUSDT", "trade"),
            ],
            7,
        );
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"method":"SUBSCRIBE","params":["btcusdt@ticker","btcusdt@trade"],"id":7}"#
        );
    }

    #[test]
    fn binance_ticker_string_numbers() {
        let json = r#"{"e":"24hrTicker","E":1700000000000,"s":"BTCUSDT","p":"150.0","P":"0.214",
            "o":"70000","h":"71000","l":"69000","c":"70150","v":"1234.5","q":"86500000"}"#;
        let ticker: BinanceTickerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.last_price, dec!(70150));
        assert_eq!(ticker.price_change_percent, dec!(0.214));
    }
}
