//! Startup Bootstrap
//!
//! Loads reference data before streaming begins:
//!
//! 1. Primary market listing -> KRW markets and their display names
//! 2. Primary ticker snapshot -> seed for the primary buffer
//! 3. Counterpart 24h tickers -> seed for the counterpart buffer, and the
//!    listing the symbol overrides are validated against
//! 4. FX rate
//!
//! Only the market listing is required. The remaining steps degrade: a
//! missing seed just means the first publication waits for live ticks, and a
//! missing FX rate leaves premiums unknown until the refresher succeeds.

use std::collections::HashSet;
use std::sync::Arc;

use crate::application::ports::{MarketDataError, MarketDataSource};
use crate::domain::correlation::MappingIssue;
use crate::domain::ticker::{
    AssetMetadata, Exchange, FxRate, Symbol, TickerRecord, TickerSnapshot,
};

use super::store::MarketStore;

/// Symbols to stream, derived from the reference data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPlan {
    /// KRW-quoted primary markets, in listing order.
    pub primary_symbols: Vec<Symbol>,
    /// Counterpart markets mapped from the primary list.
    pub counterpart_symbols: Vec<Symbol>,
    /// Number of seeded primary tickers.
    pub primary_seeded: usize,
    /// Number of seeded counterpart tickers.
    pub counterpart_seeded: usize,
    /// FX rate loaded at startup.
    pub fx_rate: Option<FxRate>,
    /// Override entries that disagree with the counterpart listing.
    pub mapping_issues: Vec<MappingIssue>,
}

/// Bootstrap failure.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The market listing could not be fetched.
    #[error("failed to load market listing: {0}")]
    MarketListing(#[source] MarketDataError),

    /// The listing contains no KRW markets.
    #[error("market listing contains no KRW markets")]
    NoMarkets,
}

/// Load reference data into `store` and plan the subscriptions.
///
/// # Errors
///
/// Returns an error if the market listing is unavailable or empty.
pub async fn bootstrap(
    store: &MarketStore,
    source: &dyn MarketDataSource,
) -> Result<BootstrapPlan, BootstrapError> {
    let markets: Vec<AssetMetadata> = source
        .fetch_markets()
        .await
        .map_err(BootstrapError::MarketListing)?
        .into_iter()
        .filter(AssetMetadata::is_krw_quoted)
        .collect();

    if markets.is_empty() {
        return Err(BootstrapError::NoMarkets);
    }

    let primary_symbols: Vec<Symbol> = markets.iter().map(|m| m.symbol.clone()).collect();
    tracing::info!(markets = primary_symbols.len(), "Loaded KRW market listing");
    store.set_asset_metadata(markets);

    let mapper = store.correlator().mapper();
    let mapped = mapper.counterpart_symbols(primary_symbols.iter().map(String::as_str));

    let primary_seeded = match source.fetch_primary_tickers(&primary_symbols).await {
        Ok(tickers) => {
            let seeded = tickers.len();
            store.set_ticker_snapshot(Exchange::Upbit, into_snapshot(tickers));
            seeded
        }
        Err(e) => {
            tracing::warn!(error = %e, "Primary ticker snapshot unavailable, waiting for stream");
            0
        }
    };

    let (counterpart_symbols, counterpart_seeded, mapping_issues) =
        match source.fetch_counterpart_tickers().await {
            Ok(tickers) => {
                let listing: HashSet<Symbol> = tickers.iter().map(|t| t.symbol.clone()).collect();
                let issues = mapper.validate(&listing);
                for issue in &issues {
                    tracing::warn!(?issue, "Symbol override disagrees with counterpart listing");
                }

                let wanted: HashSet<&Symbol> = mapped.iter().collect();
                let seed: Vec<_> = tickers
                    .into_iter()
                    .filter(|t| wanted.contains(&t.symbol))
                    .collect();
                let seeded = seed.len();
                store.set_ticker_snapshot(Exchange::Binance, into_snapshot(seed));

                let listed: Vec<Symbol> = mapped
                    .into_iter()
                    .filter(|s| listing.contains(s))
                    .collect();
                (listed, seeded, issues)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Counterpart ticker snapshot unavailable, subscribing to all mapped markets");
                (mapped, 0, Vec::new())
            }
        };

    let fx_rate = match source.fetch_fx_rate().await {
        Ok(rate) => {
            store.set_fx_rate(rate);
            Some(rate)
        }
        Err(e) => {
            tracing::warn!(error = %e, "FX rate unavailable, premiums unknown until refresh");
            None
        }
    };

    tracing::info!(
        primary = primary_symbols.len(),
        counterpart = counterpart_symbols.len(),
        primary_seeded,
        counterpart_seeded,
        "Bootstrap complete"
    );

    Ok(BootstrapPlan {
        primary_symbols,
        counterpart_symbols,
        primary_seeded,
        counterpart_seeded,
        fx_rate,
        mapping_issues,
    })
}

fn into_snapshot(tickers: Vec<TickerRecord>) -> TickerSnapshot {
    Arc::new(tickers.into_iter().map(|t| (t.symbol.clone(), t)).collect())
}
