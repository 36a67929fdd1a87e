//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `MarketStore`: Published snapshots, enriched records, ordered list
//! - `MarketEngine`: Store plus per-exchange connections, teardown
//! - `bootstrap`: Reference data loading before streaming
//! - `FxRefresher`: Periodic KRW/USD refresh

mod bootstrap;
mod engine;
mod fx;
mod store;

pub use bootstrap::{BootstrapError, BootstrapPlan, bootstrap};
pub use engine::MarketEngine;
pub use fx::{DEFAULT_FX_REFRESH_INTERVAL, FxRefresher};
pub use store::{DEFAULT_TRADE_CAPACITY, MarketStore, StoreSummary};
