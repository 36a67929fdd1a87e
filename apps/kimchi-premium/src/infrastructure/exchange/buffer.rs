//! Update Buffer and Throttled Publisher
//!
//! Tickers arrive far faster than anyone needs to re-rank. Each inbound
//! ticker replaces the buffered entry for its symbol and bumps a dirty
//! counter; a fixed-interval publisher copies the buffer into the sink only
//! when the counter is non-zero. Trades bypass the buffer.
//!
//! Closing the buffer is a hard stop: once [`UpdateBuffer::close`] returns,
//! no ticker write, snapshot publication or trade delivery happens again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::MarketSink;
use crate::domain::ticker::{Exchange, Symbol, TickerRecord, TickerSnapshot, TradeRecord};
use crate::infrastructure::metrics;

/// Default publication interval.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(200);

// =============================================================================
// Buffer State
// =============================================================================

/// Owned buffer contents.
#[derive(Debug, Clone, Default)]
pub struct BufferState {
    entries: HashMap<Symbol, TickerRecord>,
    dirty: u64,
    last_flushed: TickerSnapshot,
}

impl BufferState {
    /// Start from a previously published snapshot.
    #[must_use]
    pub fn seeded(snapshot: &TickerSnapshot) -> Self {
        Self {
            entries: snapshot.as_ref().clone(),
            dirty: 0,
            last_flushed: Arc::clone(snapshot),
        }
    }

    /// Replace the entry for the record's symbol.
    pub fn apply(&mut self, record: TickerRecord) {
        self.entries.insert(record.symbol.clone(), record);
        self.dirty = self.dirty.saturating_add(1);
    }

    /// Updates since the last flush.
    #[must_use]
    pub const fn dirty(&self) -> u64 {
        self.dirty
    }

    /// Number of buffered symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot produced by the last flush.
    #[must_use]
    pub fn last_flushed(&self) -> TickerSnapshot {
        Arc::clone(&self.last_flushed)
    }

    /// Copy the entries out if anything changed since the last flush.
    ///
    /// Returns `None` and leaves the state untouched when the dirty counter
    /// is zero.
    pub fn flush(&mut self) -> Option<TickerSnapshot> {
        if self.dirty == 0 {
            return None;
        }
        let snapshot: TickerSnapshot = Arc::new(self.entries.clone());
        self.dirty = 0;
        self.last_flushed = Arc::clone(&snapshot);
        Some(snapshot)
    }
}

// =============================================================================
// Update Buffer
// =============================================================================

struct Inner {
    state: BufferState,
    closed: bool,
}

/// Per-exchange ticker buffer in front of a [`MarketSink`].
pub struct UpdateBuffer {
    exchange: Exchange,
    sink: Arc<dyn MarketSink>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for UpdateBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("UpdateBuffer")
            .field("exchange", &self.exchange)
            .field("entries", &inner.state.len())
            .field("dirty", &inner.state.dirty())
            .field("closed", &inner.closed)
            .finish_non_exhaustive()
    }
}

impl UpdateBuffer {
    /// Create a buffer seeded with what the sink currently publishes for
    /// `exchange`, so symbols that have not ticked yet survive the first
    /// flush.
    #[must_use]
    pub fn new(exchange: Exchange, sink: Arc<dyn MarketSink>) -> Self {
        let seed = sink.ticker_snapshot(exchange);
        Self {
            exchange,
            sink,
            inner: Mutex::new(Inner {
                state: BufferState::seeded(&seed),
                closed: false,
            }),
        }
    }

    /// Exchange this buffer serves.
    #[must_use]
    pub const fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// Buffer a ticker. Returns false if the buffer is closed.
    pub fn apply_ticker(&self, record: TickerRecord) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        inner.state.apply(record);
        true
    }

    /// Deliver a trade immediately. Returns false if the buffer is closed.
    pub fn publish_trade(&self, trade: TradeRecord) -> bool {
        let inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        self.sink.publish_trade(trade);
        true
    }

    /// Publish the buffered snapshot if anything changed.
    ///
    /// Returns true if a snapshot was published.
    pub fn flush(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        let Some(snapshot) = inner.state.flush() else {
            return false;
        };
        // Published under the lock so `close` cannot interleave.
        self.sink.set_ticker_snapshot(self.exchange, snapshot);
        metrics::record_snapshot_published(self.exchange);
        true
    }

    /// Updates waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.inner.lock().state.dirty()
    }

    /// Stop accepting writes and drop buffered entries.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.state = BufferState::default();
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

// =============================================================================
// Throttled Publisher
// =============================================================================

/// Flushes an [`UpdateBuffer`] on a fixed interval.
#[derive(Debug)]
pub struct ThrottledPublisher {
    buffer: Arc<UpdateBuffer>,
    interval: Duration,
    cancel: CancellationToken,
}

impl ThrottledPublisher {
    /// Create a new publisher.
    #[must_use]
    pub const fn new(
        buffer: Arc<UpdateBuffer>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            interval,
            cancel,
        }
    }

    /// Run until cancelled.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::trace!(exchange = %self.buffer.exchange(), "Publisher cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if self.buffer.flush() {
                        tracing::trace!(exchange = %self.buffer.exchange(), "Snapshot published");
                    }
                }
            }
        }
    }
}
