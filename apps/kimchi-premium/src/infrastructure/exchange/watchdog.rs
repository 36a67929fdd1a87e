//! Liveness Watchdog
//!
//! Detects silent connections. Every inbound frame (and the open handshake)
//! records activity; the watchdog checks every `timeout / 2` and reports
//! expiry once the time since the last activity exceeds `timeout`.
//!
//! Exchanges push ticker frames continuously, so silence means the socket
//! is dead even if the TCP connection has not noticed yet.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default liveness timeout.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// Events emitted by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// No activity for longer than the timeout.
    Expired {
        /// Time since the last activity.
        idle: Duration,
    },
}

/// Activity clock shared between the read loop and the watchdog.
#[derive(Debug)]
pub struct LivenessState {
    last_activity: Mutex<Instant>,
}

impl Default for LivenessState {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessState {
    /// Create a state with activity recorded now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Record inbound activity.
    pub fn record_activity(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last recorded activity.
    #[must_use]
    pub fn idle(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

/// Watchdog for one socket session.
pub struct Watchdog {
    timeout: Duration,
    state: Arc<LivenessState>,
    event_tx: mpsc::Sender<WatchdogEvent>,
    cancel: CancellationToken,
}

impl Watchdog {
    /// Create a new watchdog.
    #[must_use]
    pub const fn new(
        timeout: Duration,
        state: Arc<LivenessState>,
        event_tx: mpsc::Sender<WatchdogEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            timeout,
            state,
            event_tx,
            cancel,
        }
    }

    /// Interval between liveness checks.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        (self.timeout / 2).max(Duration::from_millis(1))
    }

    /// Run until cancelled or expiry is reported. Reports at most once.
    pub async fn run(self) {
        let period = self.check_interval();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::trace!("Watchdog cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let idle = self.state.idle();
                    if idle > self.timeout {
                        tracing::warn!(
                            idle_ms = idle.as_millis(),
                            timeout_ms = self.timeout.as_millis(),
                            "Socket inactive past timeout"
                        );
                        let _ = self.event_tx.send(WatchdogEvent::Expired { idle }).await;
                        break;
                    }
                }
            }
        }
    }
}
