//! Exchange WebSocket Adapters
//!
//! One persistent stream per exchange:
//!
//! - **Upbit**: KRW tickers and the watched trade feed (primary)
//! - **Binance**: USDT tickers (counterpart)
//!
//! Both share the same connection, watchdog, reconnect and buffering
//! machinery; only the codec differs.

pub mod buffer;
pub mod codec;
pub mod connection;
pub mod messages;
pub mod reconnect;
pub mod watchdog;

pub use buffer::{BufferState, DEFAULT_THROTTLE_INTERVAL, ThrottledPublisher, UpdateBuffer};
pub use codec::{BinanceCodec, CodecError, FeedCodec, UpbitCodec};
pub use connection::{
    BINANCE_WS_URL, BinanceConnection, ConnectionConfig, StreamConnection, UPBIT_WS_URL,
    UpbitConnection,
};
pub use reconnect::{DisconnectReason, ReconnectPolicy};
pub use watchdog::{DEFAULT_SOCKET_TIMEOUT, LivenessState, Watchdog, WatchdogEvent};
