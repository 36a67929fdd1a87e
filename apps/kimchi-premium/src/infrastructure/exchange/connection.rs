//! Stream Connection
//!
//! A persistent, self-healing WebSocket connection to one exchange.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected --connect--> Connecting --open--> Connected
//!                               ^                    |
//!                               |          error / close / inactive
//!                               |                    v
//!                               +---- delay ---- AwaitingReconnect
//! ```
//!
//! Every session runs three tasks: the read loop, the liveness watchdog and
//! the throttled publisher. A new `connect` tears the previous session down
//! first, so there is never more than one pending reconnect.
//!
//! Transport failures never reach the caller; they are logged, counted and
//! retried after the fixed socket timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::buffer::{DEFAULT_THROTTLE_INTERVAL, ThrottledPublisher, UpdateBuffer};
use super::codec::{BinanceCodec, CodecError, FeedCodec, UpbitCodec};
use super::reconnect::{DisconnectReason, ReconnectPolicy, is_valid_transition};
use super::watchdog::{DEFAULT_SOCKET_TIMEOUT, LivenessState, Watchdog, WatchdogEvent};
use crate::application::ports::{
    ConnectionError, ConnectionState, FeedConnection, FeedStatus, MarketSink,
};
use crate::domain::subscription::SubscriptionSpec;
use crate::domain::ticker::{Exchange, StreamMessage, Symbol};
use crate::infrastructure::metrics;

/// Default Upbit quotation stream.
pub const UPBIT_WS_URL: &str = "wss://api.upbit.com/websocket/v1";

/// Default Binance combined stream.
pub const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/stream";

/// Upper bound on sending a close frame while tearing a session down.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Error Type
// =============================================================================

/// Reasons a session ends. Internal; always recovered by reconnecting.
#[derive(Debug, thiserror::Error)]
enum SessionError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("no frame for {idle:?}")]
    Inactive { idle: Duration },

    #[error("connection closed")]
    Closed,
}

impl SessionError {
    const fn reason(&self) -> DisconnectReason {
        match self {
            Self::Inactive { .. } => DisconnectReason::Inactive,
            Self::WebSocket(_) | Self::Codec(_) | Self::Closed => DisconnectReason::Transport,
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a stream connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Liveness timeout and reconnect delay.
    pub socket_timeout: Duration,
    /// Snapshot publication interval.
    pub throttle_interval: Duration,
}

impl ConnectionConfig {
    /// Create a configuration with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
        }
    }

    /// Set the liveness timeout.
    #[must_use]
    pub const fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Set the publication interval.
    #[must_use]
    pub const fn with_throttle_interval(mut self, interval: Duration) -> Self {
        self.throttle_interval = interval;
        self
    }
}

// =============================================================================
// Shared State
// =============================================================================

#[derive(Debug)]
enum SessionCommand {
    ChangeTrades { previous: Vec<Symbol> },
}

#[derive(Debug, Default)]
struct StateCell {
    generation: u64,
    state: ConnectionState,
}

struct Shared<C> {
    exchange: Exchange,
    config: ConnectionConfig,
    codec: C,
    sink: Arc<dyn MarketSink>,
    spec: Mutex<Option<SubscriptionSpec>>,
    state: Mutex<StateCell>,
    messages_received: AtomicU64,
    malformed_messages: AtomicU64,
    reconnects: AtomicU64,
}

impl<C: FeedCodec> Shared<C> {
    /// Invalidate any running session and return the new generation.
    fn next_generation(&self) -> u64 {
        let mut cell = self.state.lock();
        cell.generation = cell.generation.wrapping_add(1);
        cell.state = ConnectionState::Disconnected;
        metrics::set_feed_ready(self.exchange, false);
        cell.generation
    }

    /// Apply a transition on behalf of session `generation`. Stale sessions
    /// are ignored.
    fn transition(&self, generation: u64, to: ConnectionState) {
        let mut cell = self.state.lock();
        if cell.generation != generation {
            return;
        }
        if !is_valid_transition(cell.state, to) {
            tracing::warn!(
                exchange = %self.exchange,
                from = ?cell.state,
                to = ?to,
                "Unexpected connection state transition"
            );
        }
        cell.state = to;
        metrics::set_feed_ready(self.exchange, to == ConnectionState::Connected);
    }

    fn current_spec(&self) -> Option<SubscriptionSpec> {
        self.spec.lock().clone()
    }

    fn handle_payload(&self, payload: &[u8], buffer: &UpdateBuffer) {
        match self.codec.decode(payload) {
            Ok(Some(message)) => {
                self.messages_received.fetch_add(1, Ordering::Relaxed);
                metrics::record_message_received(self.exchange, message.kind());
                match message {
                    StreamMessage::Ticker(ticker) => {
                        buffer.apply_ticker(ticker);
                    }
                    StreamMessage::Trade(trade) => {
                        buffer.publish_trade(trade);
                    }
                }
            }
            Ok(None) => {
                tracing::trace!(exchange = %self.exchange, "Ignoring control frame");
            }
            Err(e) => {
                self.malformed_messages.fetch_add(1, Ordering::Relaxed);
                metrics::record_malformed_message(self.exchange);
                tracing::debug!(exchange = %self.exchange, error = %e, "Dropping malformed frame");
            }
        }
    }

    /// Session loop: connect, stream, wait, repeat until cancelled.
    async fn run(
        self: Arc<Self>,
        generation: u64,
        buffer: Arc<UpdateBuffer>,
        cancel: CancellationToken,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    ) {
        let mut policy = ReconnectPolicy::new(self.config.socket_timeout);

        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.transition(generation, ConnectionState::Connecting);

            let error = match self
                .connect_and_stream(generation, &buffer, &cancel, &mut command_rx, &mut policy)
                .await
            {
                Ok(()) => break,
                Err(e) => e,
            };

            self.transition(generation, ConnectionState::AwaitingReconnect);
            self.reconnects.fetch_add(1, Ordering::Relaxed);
            metrics::record_reconnect(self.exchange);

            let delay = policy.next_delay();
            tracing::warn!(
                exchange = %self.exchange,
                reason = error.reason().as_str(),
                error = %error,
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Stream disconnected, reconnect scheduled"
            );

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!(exchange = %self.exchange, "Session loop stopped");
    }

    /// Open one socket and stream until it fails. `Ok` means cancelled.
    async fn connect_and_stream(
        &self,
        generation: u64,
        buffer: &UpdateBuffer,
        cancel: &CancellationToken,
        command_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), SessionError> {
        tracing::info!(exchange = %self.exchange, url = %self.config.url, "Connecting to stream");

        let timeout = self.config.socket_timeout;
        let (ws_stream, _response) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(&self.config.url)) => {
                result.map_err(|_| SessionError::Inactive { idle: timeout })??
            }
        };

        // The handshake counts as activity.
        let liveness = Arc::new(LivenessState::new());
        let (mut write, mut read) = ws_stream.split();

        // The spec is read fresh below; queued changes are already in it.
        while command_rx.try_recv().is_ok() {}
        let Some(spec) = self.current_spec() else {
            return Ok(());
        };
        for frame in self.codec.subscribe_frames(&spec)? {
            tracing::debug!(exchange = %self.exchange, frame = %frame, "Sending subscription");
            write.send(Message::Text(frame.into())).await?;
        }

        self.transition(generation, ConnectionState::Connected);
        policy.reset();
        tracing::info!(
            exchange = %self.exchange,
            tickers = spec.ticker_symbols.len(),
            trades = spec.trade_symbols.len(),
            "Stream connected"
        );

        let watchdog_cancel = cancel.child_token();
        let _watchdog_guard = watchdog_cancel.clone().drop_guard();
        let (watchdog_tx, mut watchdog_rx) = mpsc::channel::<WatchdogEvent>(1);
        tokio::spawn(
            Watchdog::new(
                self.config.socket_timeout,
                Arc::clone(&liveness),
                watchdog_tx,
                watchdog_cancel,
            )
            .run(),
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    send_close(&mut write, CLOSE_FRAME_TIMEOUT).await;
                    return Ok(());
                }
                event = watchdog_rx.recv() => {
                    match event {
                        Some(WatchdogEvent::Expired { idle }) => {
                            send_close(&mut write, CLOSE_FRAME_TIMEOUT).await;
                            return Err(SessionError::Inactive { idle });
                        }
                        None => return Ok(()),
                    }
                }
                command = command_rx.recv() => {
                    match command {
                        Some(SessionCommand::ChangeTrades { previous }) => {
                            let Some(spec) = self.current_spec() else {
                                continue;
                            };
                            match self.codec.resubscribe_frames(&spec, &previous) {
                                Ok(frames) => {
                                    for frame in frames {
                                        tracing::debug!(
                                            exchange = %self.exchange,
                                            frame = %frame,
                                            "Updating trade subscription"
                                        );
                                        write.send(Message::Text(frame.into())).await?;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(
                                        exchange = %self.exchange,
                                        error = %e,
                                        "Failed to encode trade subscription"
                                    );
                                }
                            }
                        }
                        None => return Ok(()),
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            liveness.record_activity();
                            self.handle_payload(text.as_bytes(), buffer);
                        }
                        Some(Ok(Message::Binary(data))) => {
                            liveness.record_activity();
                            self.handle_payload(&data, buffer);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            liveness.record_activity();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(exchange = %self.exchange, frame = ?frame, "Server sent close frame");
                            return Err(SessionError::Closed);
                        }
                        Some(Ok(_)) => {
                            liveness.record_activity();
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(SessionError::Closed),
                    }
                }
            }
        }
    }
}

/// Best-effort close frame. A peer that stops draining the socket must not
/// hold up teardown, so the send is abandoned after `limit`.
async fn send_close<S>(write: &mut S, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
{
    match tokio::time::timeout(limit, write.send(Message::Close(None))).await {
        Ok(result) => result.is_ok(),
        Err(_) => {
            tracing::debug!(?limit, "Close frame not sent in time, dropping socket");
            false
        }
    }
}

// =============================================================================
// Stream Connection
// =============================================================================

struct Session {
    cancel: CancellationToken,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    buffer: Arc<UpdateBuffer>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Stop timers, close the buffer and abort the tasks. After this returns
    /// nothing the session owned can write to the sink.
    fn shutdown(self) {
        self.cancel.cancel();
        self.buffer.close();
        for task in self.tasks {
            task.abort();
        }
    }
}

/// WebSocket feed for one exchange, generic over its wire protocol.
pub struct StreamConnection<C: FeedCodec> {
    shared: Arc<Shared<C>>,
    session: Mutex<Option<Session>>,
}

/// Upbit (primary) connection.
pub type UpbitConnection = StreamConnection<UpbitCodec>;

/// Binance (counterpart) connection.
pub type BinanceConnection = StreamConnection<BinanceCodec>;

impl<C: FeedCodec> std::fmt::Debug for StreamConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("exchange", &self.shared.exchange)
            .field("url", &self.shared.config.url)
            .field("state", &self.shared.state.lock().state)
            .finish_non_exhaustive()
    }
}

impl<C: FeedCodec> StreamConnection<C> {
    /// Create a disconnected connection.
    #[must_use]
    pub fn new(codec: C, config: ConnectionConfig, sink: Arc<dyn MarketSink>) -> Self {
        Self {
            shared: Arc::new(Shared {
                exchange: codec.exchange(),
                config,
                codec,
                sink,
                spec: Mutex::new(None),
                state: Mutex::new(StateCell::default()),
                messages_received: AtomicU64::new(0),
                malformed_messages: AtomicU64::new(0),
                reconnects: AtomicU64::new(0),
            }),
            session: Mutex::new(None),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Recorded subscription, if any.
    #[must_use]
    pub fn subscription(&self) -> Option<SubscriptionSpec> {
        self.shared.current_spec()
    }

    fn stop_session(&self) {
        if let Some(session) = self.session.lock().take() {
            session.shutdown();
        }
    }
}

impl UpbitConnection {
    /// Create an Upbit connection.
    #[must_use]
    pub fn upbit(config: ConnectionConfig, sink: Arc<dyn MarketSink>) -> Self {
        Self::new(UpbitCodec::new(), config, sink)
    }
}

impl BinanceConnection {
    /// Create a Binance connection.
    #[must_use]
    pub fn binance(config: ConnectionConfig, sink: Arc<dyn MarketSink>) -> Self {
        Self::new(BinanceCodec::new(), config, sink)
    }
}

impl<C: FeedCodec> FeedConnection for StreamConnection<C> {
    fn exchange(&self) -> Exchange {
        self.shared.exchange
    }

    fn connect(&self, spec: SubscriptionSpec) -> Result<(), ConnectionError> {
        spec.validate()?;

        let mut session = self.session.lock();
        if let Some(previous) = session.take() {
            tracing::debug!(exchange = %self.shared.exchange, "Replacing running session");
            previous.shutdown();
        }

        *self.shared.spec.lock() = Some(spec);
        let generation = self.shared.next_generation();

        let cancel = CancellationToken::new();
        let buffer = Arc::new(UpdateBuffer::new(
            self.shared.exchange,
            Arc::clone(&self.shared.sink),
        ));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let publisher = tokio::spawn(
            ThrottledPublisher::new(
                Arc::clone(&buffer),
                self.shared.config.throttle_interval,
                cancel.clone(),
            )
            .run(),
        );
        let reader = tokio::spawn(Arc::clone(&self.shared).run(
            generation,
            Arc::clone(&buffer),
            cancel.clone(),
            command_rx,
        ));

        *session = Some(Session {
            cancel,
            command_tx,
            buffer,
            tasks: vec![reader, publisher],
        });
        Ok(())
    }

    fn change_trade_subscription(&self, symbols: Vec<Symbol>) {
        let previous = {
            let mut spec = self.shared.spec.lock();
            let Some(current) = spec.as_mut() else {
                tracing::debug!(
                    exchange = %self.shared.exchange,
                    "No subscription recorded, ignoring trade change"
                );
                return;
            };
            let previous = current.trade_symbols.clone();
            *current = current.replace_trades(symbols);
            previous
        };

        // Without a live session the recorded spec is used on the next connect.
        if let Some(session) = self.session.lock().as_ref() {
            let _ = session
                .command_tx
                .send(SessionCommand::ChangeTrades { previous });
        }
    }

    fn disconnect(&self) {
        self.stop_session();
        *self.shared.spec.lock() = None;
        self.shared.next_generation();
        tracing::info!(exchange = %self.shared.exchange, "Stream disconnected");
    }

    fn status(&self) -> FeedStatus {
        FeedStatus {
            exchange: self.shared.exchange,
            state: self.shared.state.lock().state,
            messages_received: self.shared.messages_received.load(Ordering::Relaxed),
            malformed_messages: self.shared.malformed_messages.load(Ordering::Relaxed),
            reconnects: self.shared.reconnects.load(Ordering::Relaxed),
        }
    }
}

impl<C: FeedCodec> Drop for StreamConnection<C> {
    fn drop(&mut self) {
        self.stop_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::SubscriptionError;
    use crate::domain::ticker::{TickerSnapshot, TradeRecord};

    #[derive(Default)]
    struct NullSink;

    impl MarketSink for NullSink {
        fn ticker_snapshot(&self, _exchange: Exchange) -> TickerSnapshot {
            TickerSnapshot::default()
        }

        fn set_ticker_snapshot(&self, _exchange: Exchange, _snapshot: TickerSnapshot) {}

        fn publish_trade(&self, _trade: TradeRecord) {}
    }

    fn connection() -> UpbitConnection {
        UpbitConnection::upbit(
            ConnectionConfig::new("ws://127.0.0.1:9"),
            Arc::new(NullSink),
        )
    }

    #[test]
    fn config_defaults() {
        let config = ConnectionConfig::new(UPBIT_WS_URL);
        assert_eq!(config.socket_timeout, Duration::from_secs(5));
        assert_eq!(config.throttle_interval, Duration::from_millis(200));

        let config = config
            .with_socket_timeout(Duration::from_secs(1))
            .with_throttle_interval(Duration::from_millis(50));
        assert_eq!(config.socket_timeout, Duration::from_secs(1));
        assert_eq!(config.throttle_interval, Duration::from_millis(50));
    }

    #[test]
    fn new_connection_is_disconnected() {
        let connection = connection();
        let status = connection.status();
        assert_eq!(status.exchange, Exchange::Upbit);
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(!connection.is_ready());
        assert!(connection.subscription().is_none());
    }

    #[test]
    fn empty_spec_is_rejected_synchronously() {
        let connection = connection();
        let result = connection.connect(SubscriptionSpec::tickers(Vec::<Symbol>::new()));
        assert_eq!(
            result,
            Err(ConnectionError::InvalidSubscription(
                SubscriptionError::EmptyTickerSymbols
            ))
        );
        assert!(connection.subscription().is_none());
        assert_eq!(connection.status().state, ConnectionState::Disconnected);
    }

    /// Sink whose peer never drains.
    struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = std::convert::Infallible;

        fn poll_ready(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Pending
        }

        fn start_send(self: std::pin::Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Pending
        }

        fn poll_close(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Pending
        }
    }

    #[tokio::test(start_paused = true)]
    async fn close_frame_gives_up_on_stalled_peer() {
        let started = tokio::time::Instant::now();
        let sent = send_close(&mut StalledSink, Duration::from_millis(250)).await;

        assert!(!sent);
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn close_frame_is_sent_to_ready_peer() {
        let mut sink: Vec<Message> = Vec::new();

        assert!(send_close(&mut sink, Duration::from_secs(1)).await);
        assert_eq!(sink, vec![Message::Close(None)]);
    }

    #[test]
    fn trade_change_without_subscription_is_ignored() {
        let connection = connection();
        connection.change_trade_subscription(vec!["KRW-BTC".to_string()]);
        assert!(connection.subscription().is_none());
    }

    #[tokio::test]
    async fn trade_change_is_recorded_and_disconnect_clears_it() {
        let connection = connection();
        connection
            .connect(SubscriptionSpec::tickers(["KRW-BTC".to_string()]))
            .unwrap();

        connection.change_trade_subscription(vec!["KRW-ETH".to_string()]);
        let spec = connection.subscription().unwrap();
        assert_eq!(spec.ticker_symbols, vec!["KRW-BTC".to_string()]);
        assert_eq!(spec.trade_symbols, vec!["KRW-ETH".to_string()]);

        connection.disconnect();
        assert!(connection.subscription().is_none());
        assert_eq!(connection.status().state, ConnectionState::Disconnected);

        // Idempotent.
        connection.disconnect();
        assert_eq!(connection.status().state, ConnectionState::Disconnected);
    }
}
