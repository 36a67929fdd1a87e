//! FX Rate Refresher
//!
//! Periodically refetches the KRW/USD rate. A failed fetch keeps the
//! previous rate; premiums are computed from a stale rate rather than
//! disappearing.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::MarketDataSource;

use super::store::MarketStore;

/// Default refresh interval.
pub const DEFAULT_FX_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Background task keeping the store's FX rate fresh.
pub struct FxRefresher {
    source: Arc<dyn MarketDataSource>,
    store: Arc<MarketStore>,
    interval: Duration,
}

impl FxRefresher {
    /// Create a refresher.
    #[must_use]
    pub fn new(source: Arc<dyn MarketDataSource>, store: Arc<MarketStore>, interval: Duration) -> Self {
        Self {
            source,
            store,
            interval,
        }
    }

    /// Fetch once and store the result. Returns true on success.
    pub async fn refresh_once(&self) -> bool {
        match self.source.fetch_fx_rate().await {
            Ok(rate) => {
                tracing::debug!(rate = %rate.base_price, "FX rate refreshed");
                self.store.set_fx_rate(rate);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "FX rate refresh failed, keeping previous rate");
                false
            }
        }
    }

    /// Run until `cancel` fires. The first fetch happens one interval after
    /// start, since bootstrap has just loaded a rate.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!("FX refresher stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.refresh_once().await;
                    }
                }
            }
        })
    }
}
