//! Reconnection Policy
//!
//! Fixed-delay reconnection. Both watchdog expiry and transport errors wait
//! the same full delay before the next attempt; the delay never grows.
//!
//! A session loop owns exactly one policy, so at most one reconnect is ever
//! pending per connection.

use std::time::Duration;

use crate::application::ports::ConnectionState;

/// Why a session ended and a reconnect was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The liveness watchdog expired.
    Inactive,
    /// The socket failed or was closed by the server.
    Transport,
}

impl DisconnectReason {
    /// Label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Transport => "transport",
        }
    }
}

/// Fixed-delay reconnection policy.
///
/// # Example
///
/// ```rust
/// use kimchi_premium::infrastructure::exchange::reconnect::ReconnectPolicy;
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(Duration::from_secs(5));
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
/// assert_eq!(policy.attempt_count(), 2);
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy waiting `delay` before every attempt.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            attempt_count: 0,
        }
    }

    /// Record an attempt and return the delay to wait before it.
    pub const fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.delay
    }

    /// Reset the attempt count after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts since the last successful connection.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

/// Returns true if the lifecycle may move from `from` to `to`.
///
/// `Disconnected` is reachable from every state; everything else follows
/// `Connecting -> Connected -> AwaitingReconnect -> Connecting`.
#[must_use]
pub const fn is_valid_transition(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::{AwaitingReconnect, Connected, Connecting, Disconnected};

    matches!(
        (from, to),
        (_, Disconnected)
            | (Disconnected | AwaitingReconnect, Connecting)
            | (Connecting, Connected | AwaitingReconnect)
            | (Connected, AwaitingReconnect)
    )
}
