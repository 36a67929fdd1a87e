//! Stream Codec Module
//!
//! Encodes subscription requests and decodes inbound frames for each
//! exchange. Decoding yields:
//!
//! - `Ok(Some(StreamMessage))` for ticker and trade frames
//! - `Ok(None)` for control frames (acks, keep-alive status)
//! - `Err(CodecError)` for anything else; the caller drops the frame
//!
//! The discriminator field is read first and the payload is then decoded
//! into the matching wire type, so a ticker is never mistaken for a trade.

use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use uuid::Uuid;

use super::messages::{
    BinanceEnvelope, BinanceRequest, BinanceTickerMessage, BinanceTradeMessage,
    UpbitDirective, UpbitErrorMessage, UpbitTickerMessage, UpbitTradeMessage, binance_stream_name,
};
use crate::domain::subscription::SubscriptionSpec;
use crate::domain::ticker::{
    AskBid, ChangeDirection, Exchange, StreamMessage, StreamType, Symbol, TickerRecord,
    TradeRecord,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Frame has no message type.
    #[error("frame has no message type")]
    MissingMessageType,

    /// The exchange reported an error.
    #[error("exchange error: {0}")]
    Exchange(String),
}

/// Per-exchange wire protocol.
pub trait FeedCodec: Send + Sync + 'static {
    /// Exchange this codec speaks to.
    fn exchange(&self) -> Exchange;

    /// Frames to send right after the socket opens.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame cannot be serialized.
    fn subscribe_frames(&self, spec: &SubscriptionSpec) -> Result<Vec<String>, CodecError>;

    /// Frames to send on an open socket when the trade list changes from
    /// `previous_trades` to `spec.trade_symbols`.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame cannot be serialized.
    fn resubscribe_frames(
        &self,
        spec: &SubscriptionSpec,
        previous_trades: &[Symbol],
    ) -> Result<Vec<String>, CodecError>;

    /// Decode one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is malformed or of an unknown type.
    fn decode(&self, payload: &[u8]) -> Result<Option<StreamMessage>, CodecError>;
}

fn parse_json(payload: &[u8]) -> Result<serde_json::Value, CodecError> {
    let text = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)?;
    Ok(serde_json::from_str(text.trim())?)
}

// =============================================================================
// Upbit
// =============================================================================

/// Codec for the Upbit quotation stream.
#[derive(Debug, Default, Clone)]
pub struct UpbitCodec;

impl UpbitCodec {
    /// Create a new Upbit codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn subscription(spec: &SubscriptionSpec) -> Vec<UpbitDirective> {
        let mut frame = vec![
            UpbitDirective::Ticket {
                ticket: Uuid::new_v4().to_string(),
            },
            UpbitDirective::channel("ticker", &spec.ticker_symbols),
        ];
        if spec.has_trades() {
            frame.push(UpbitDirective::channel("trade", &spec.trade_symbols));
        }
        frame.push(UpbitDirective::Format {
            format: spec.format.as_str().to_string(),
        });
        frame
    }

    fn ticker(message: UpbitTickerMessage) -> TickerRecord {
        TickerRecord {
            exchange: Exchange::Upbit,
            symbol: message.code,
            trade_price: message.trade_price,
            opening_price: message.opening_price,
            high_price: message.high_price,
            low_price: message.low_price,
            change: message.change,
            signed_change_price: message.signed_change_price,
            signed_change_rate: message.signed_change_rate,
            acc_trade_volume_24h: message.acc_trade_volume_24h,
            acc_trade_price_24h: message.acc_trade_price_24h,
            highest_52_week_price: message.highest_52_week_price,
            lowest_52_week_price: message.lowest_52_week_price,
            timestamp: message.timestamp,
            stream_type: message.stream_type.unwrap_or(StreamType::Snapshot),
        }
    }

    /// Convert a REST ticker into a seed record.
    #[must_use]
    pub fn snapshot_ticker(message: UpbitTickerMessage) -> TickerRecord {
        TickerRecord {
            stream_type: StreamType::Snapshot,
            ..Self::ticker(message)
        }
    }
}

impl FeedCodec for UpbitCodec {
    fn exchange(&self) -> Exchange {
        Exchange::Upbit
    }

    fn subscribe_frames(&self, spec: &SubscriptionSpec) -> Result<Vec<String>, CodecError> {
        Ok(vec![serde_json::to_string(&Self::subscription(spec))?])
    }

    fn resubscribe_frames(
        &self,
        spec: &SubscriptionSpec,
        _previous_trades: &[Symbol],
    ) -> Result<Vec<String>, CodecError> {
        // A new ticket replaces the previous subscription set on this socket.
        self.subscribe_frames(spec)
    }

    fn decode(&self, payload: &[u8]) -> Result<Option<StreamMessage>, CodecError> {
        let value = parse_json(payload)?;

        let msg_type = value
            .get("ty")
            .or_else(|| value.get("type"))
            .and_then(serde_json::Value::as_str);

        match msg_type {
            Some("ticker") => {
                let message: UpbitTickerMessage = serde_json::from_value(value)?;
                Ok(Some(StreamMessage::Ticker(Self::ticker(message))))
            }
            Some("trade") => {
                let message: UpbitTradeMessage = serde_json::from_value(value)?;
                Ok(Some(StreamMessage::Trade(TradeRecord {
                    exchange: Exchange::Upbit,
                    symbol: message.code,
                    trade_price: message.trade_price,
                    trade_volume: message.trade_volume,
                    ask_bid: message.ask_bid,
                    timestamp: message.trade_timestamp,
                    sequential_id: message.sequential_id,
                })))
            }
            Some(other) => Err(CodecError::UnknownMessageType(other.to_string())),
            None if value.get("status").is_some() => Ok(None),
            None if value.get("error").is_some() => {
                let message: UpbitErrorMessage = serde_json::from_value(value)?;
                Err(CodecError::Exchange(format!(
                    "{}: {}",
                    message.error.name,
                    message.error.message.unwrap_or_default()
                )))
            }
            None => Err(CodecError::MissingMessageType),
        }
    }
}

// =============================================================================
// Binance
// =============================================================================

/// Codec for the Binance combined stream.
#[derive(Debug)]
pub struct BinanceCodec {
    next_id: AtomicU64,
}

impl Default for BinanceCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BinanceCodec {
    /// Create a new Binance codec.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn streams(symbols: &[Symbol], channel: &str) -> Vec<String> {
        symbols
            .iter()
            .map(|s| binance_stream_name(s, channel))
            .collect()
    }

    fn subscribe_request(&self, spec: &SubscriptionSpec) -> BinanceRequest {
        let mut params = Self::streams(&spec.ticker_symbols, "ticker");
        params.extend(Self::streams(&spec.trade_symbols, "trade"));
        BinanceRequest::subscribe(params, self.next_id())
    }

    fn ticker(message: BinanceTickerMessage) -> TickerRecord {
        TickerRecord {
            exchange: Exchange::Binance,
            symbol: message.symbol,
            trade_price: message.last_price,
            opening_price: message.open_price,
            high_price: message.high_price,
            low_price: message.low_price,
            change: ChangeDirection::from_signed(message.price_change),
            signed_change_price: message.price_change,
            signed_change_rate: percent_to_rate(message.price_change_percent),
            acc_trade_volume_24h: message.volume,
            acc_trade_price_24h: message.quote_volume,
            highest_52_week_price: None,
            lowest_52_week_price: None,
            timestamp: message.event_time,
            stream_type: StreamType::Realtime,
        }
    }
}

/// Convert a percentage (`2.5`) into a rate (`0.025`).
#[must_use]
pub fn percent_to_rate(percent: Decimal) -> Decimal {
    percent
        .checked_div(Decimal::ONE_HUNDRED)
        .unwrap_or(Decimal::ZERO)
}

impl FeedCodec for BinanceCodec {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn subscribe_frames(&self, spec: &SubscriptionSpec) -> Result<Vec<String>, CodecError> {
        Ok(vec![serde_json::to_string(&self.subscribe_request(spec))?])
    }

    fn resubscribe_frames(
        &self,
        spec: &SubscriptionSpec,
        previous_trades: &[Symbol],
    ) -> Result<Vec<String>, CodecError> {
        let mut frames = Vec::with_capacity(2);
        if !previous_trades.is_empty() {
            let request =
                BinanceRequest::unsubscribe(Self::streams(previous_trades, "trade"), self.next_id());
            frames.push(serde_json::to_string(&request)?);
        }
        frames.push(serde_json::to_string(&self.subscribe_request(spec))?);
        Ok(frames)
    }

    fn decode(&self, payload: &[u8]) -> Result<Option<StreamMessage>, CodecError> {
        let value = parse_json(payload)?;

        if value.get("result").is_some() && value.get("id").is_some() {
            return Ok(None);
        }
        if let Some(error) = value.get("error") {
            return Err(CodecError::Exchange(error.to_string()));
        }

        let data = if value.get("stream").is_some() {
            serde_json::from_value::<BinanceEnvelope>(value)?.data
        } else {
            value
        };

        match data.get("e").and_then(serde_json::Value::as_str) {
            Some("24hrTicker") => {
                let message: BinanceTickerMessage = serde_json::from_value(data)?;
                Ok(Some(StreamMessage::Ticker(Self::ticker(message))))
            }
            Some("trade") => {
                let message: BinanceTradeMessage = serde_json::from_value(data)?;
                Ok(Some(StreamMessage::Trade(TradeRecord {
                    exchange: Exchange::Binance,
                    symbol: message.symbol,
                    trade_price: message.price,
                    trade_volume: message.quantity,
                    ask_bid: if message.buyer_is_maker {
                        AskBid::Ask
                    } else {
                        AskBid::Bid
                    },
                    timestamp: message.trade_time,
                    sequential_id: Some(message.trade_id),
                })))
            }
            Some(other) => Err(CodecError::UnknownMessageType(other.to_string())),
            None => Err(CodecError::MissingMessageType),
        }
    }
}
