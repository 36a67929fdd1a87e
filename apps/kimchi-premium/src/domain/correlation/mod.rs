//! Cross-Exchange Correlation
//!
//! Joins the primary (KRW) snapshot with the counterpart (USDT) snapshot and
//! the KRW/USD rate, producing one [`EnrichedRecord`] per primary market.
//!
//! # Premium
//!
//! ```text
//! counterpart_krw = counterpart_price * fx_rate
//! premium         = (1 - counterpart_krw / primary_price) * 100
//! ```
//!
//! A market without a counterpart (unmapped, excluded, not listed, or no FX
//! rate yet) carries `premium: None`. Zero is a real premium value and is
//! never used as a placeholder.
//!
//! # Symbol Mapping
//!
//! `KRW-XYZ` maps to `XYZUSDT` unless the override table says otherwise.
//! The override table is configuration: it can rename the counterpart base
//! (`BTT` -> `BTTC`) or exclude a market entirely (`BTG` -> none).

use std::collections::{BTreeMap, HashMap, HashSet};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::ticker::{AssetMetadata, FxRate, KRW_MARKET_PREFIX, Symbol, TickerRecord};

/// Quote currency suffix of counterpart markets.
pub const COUNTERPART_QUOTE_SUFFIX: &str = "USDT";

/// Decimal places kept on the premium percentage.
pub const PREMIUM_DECIMAL_PLACES: u32 = 2;

/// Overrides applied when no configuration is supplied.
///
/// Each entry is `(primary base, counterpart base)`; `None` excludes the
/// market from correlation.
pub const DEFAULT_SYMBOL_OVERRIDES: &[(&str, Option<&str>)] = &[
    ("BTT", Some("BTTC")),
    ("BTG", None),
    ("NU", None),
    ("POLY", None),
];

// =============================================================================
// Symbol Mapper
// =============================================================================

/// Maps primary market codes to counterpart market codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMapper {
    overrides: HashMap<String, Option<String>>,
}

impl Default for SymbolMapper {
    fn default() -> Self {
        Self::new(
            DEFAULT_SYMBOL_OVERRIDES
                .iter()
                .map(|(base, target)| ((*base).to_string(), target.map(str::to_string))),
        )
    }
}

impl SymbolMapper {
    /// Create a mapper with the given override table.
    ///
    /// Keys and values are primary/counterpart base assets, case-insensitive.
    #[must_use]
    pub fn new(overrides: impl IntoIterator<Item = (String, Option<String>)>) -> Self {
        Self {
            overrides: overrides
                .into_iter()
                .map(|(base, target)| (base.to_uppercase(), target.map(|t| t.to_uppercase())))
                .collect(),
        }
    }

    /// Parse an override table of the form `BTT=BTTC,BTG=,NU=`.
    ///
    /// An empty right-hand side excludes the base asset.
    ///
    /// # Errors
    ///
    /// Returns an error for an entry without `=` or with an empty base.
    pub fn parse_overrides(spec: &str) -> Result<Self, MappingParseError> {
        let mut overrides = Vec::new();

        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (base, target) = entry
                .split_once('=')
                .ok_or_else(|| MappingParseError::MissingSeparator(entry.to_string()))?;
            let base = base.trim();
            if base.is_empty() {
                return Err(MappingParseError::EmptyBase(entry.to_string()));
            }
            let target = target.trim();
            let target = (!target.is_empty()).then(|| target.to_string());
            overrides.push((base.to_string(), target));
        }

        Ok(Self::new(overrides))
    }

    /// Counterpart market code for a primary market, if one exists.
    #[must_use]
    pub fn counterpart_symbol(&self, primary: &str) -> Option<Symbol> {
        let base = strip_krw_prefix(primary)?.to_uppercase();

        match self.overrides.get(&base) {
            Some(Some(target)) => Some(format!("{target}{COUNTERPART_QUOTE_SUFFIX}")),
            Some(None) => None,
            None => Some(format!("{base}{COUNTERPART_QUOTE_SUFFIX}")),
        }
    }

    /// Counterpart market codes for a list of primary markets, skipping
    /// excluded markets and keeping the first occurrence of each code.
    #[must_use]
    pub fn counterpart_symbols<'a>(&self, primaries: impl IntoIterator<Item = &'a str>) -> Vec<Symbol> {
        let mut seen = HashSet::new();
        primaries
            .into_iter()
            .filter_map(|p| self.counterpart_symbol(p))
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }

    /// Check the override table against the counterpart's live listing.
    ///
    /// Reports overrides that point at a market the counterpart does not
    /// list, and exclusions whose default market the counterpart does list.
    #[must_use]
    pub fn validate(&self, counterpart_listing: &HashSet<Symbol>) -> Vec<MappingIssue> {
        let mut issues: Vec<MappingIssue> = self
            .overrides
            .iter()
            .filter_map(|(base, target)| match target {
                Some(target) => {
                    let counterpart = format!("{target}{COUNTERPART_QUOTE_SUFFIX}");
                    (!counterpart_listing.contains(&counterpart)).then(|| {
                        MappingIssue::MissingCounterpart {
                            base: base.clone(),
                            counterpart,
                        }
                    })
                }
                None => {
                    let counterpart = format!("{base}{COUNTERPART_QUOTE_SUFFIX}");
                    counterpart_listing.contains(&counterpart).then(|| {
                        MappingIssue::ExcludedButListed {
                            base: base.clone(),
                            counterpart,
                        }
                    })
                }
            })
            .collect();
        issues.sort_by(|a, b| a.base().cmp(b.base()));
        issues
    }

    /// Number of override entries.
    #[must_use]
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

fn strip_krw_prefix(symbol: &str) -> Option<&str> {
    let prefix = symbol.get(..KRW_MARKET_PREFIX.len())?;
    if prefix.eq_ignore_ascii_case(KRW_MARKET_PREFIX) {
        symbol.get(KRW_MARKET_PREFIX.len()..).filter(|b| !b.is_empty())
    } else {
        None
    }
}

/// A mismatch between the override table and the counterpart listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingIssue {
    /// The override points at a market the counterpart does not list.
    MissingCounterpart {
        /// Primary base asset.
        base: String,
        /// Counterpart market the override expects.
        counterpart: Symbol,
    },
    /// The market is excluded but the counterpart lists the default code.
    ExcludedButListed {
        /// Primary base asset.
        base: String,
        /// Counterpart market that exists.
        counterpart: Symbol,
    },
}

impl MappingIssue {
    /// Primary base asset the issue concerns.
    #[must_use]
    pub fn base(&self) -> &str {
        match self {
            Self::MissingCounterpart { base, .. } | Self::ExcludedButListed { base, .. } => base,
        }
    }
}

/// Invalid override table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingParseError {
    /// Entry lacks `=`.
    #[error("override entry '{0}' is missing '='")]
    MissingSeparator(String),
    /// Entry has an empty base asset.
    #[error("override entry '{0}' has an empty base asset")]
    EmptyBase(String),
}

// =============================================================================
// Enriched Record
// =============================================================================

/// Primary ticker joined with names, counterpart data and premium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// Primary exchange ticker.
    #[serde(flatten)]
    pub ticker: TickerRecord,
    /// Korean display name, if metadata is loaded.
    pub korean_name: Option<String>,
    /// English display name, if metadata is loaded.
    pub english_name: Option<String>,
    /// Mapped counterpart market code, present whether or not the
    /// counterpart has been priced. `None` for excluded or non-KRW markets.
    pub counterpart_symbol: Option<Symbol>,
    /// Counterpart last price in USDT.
    pub counterpart_price: Option<Decimal>,
    /// Counterpart last price converted to KRW, rounded to the primary
    /// price's precision.
    pub counterpart_price_krw: Option<Decimal>,
    /// Counterpart 24h traded value in USDT.
    pub counterpart_volume: Option<Decimal>,
    /// Premium in percent, two decimal places.
    pub premium: Option<Decimal>,
}

impl EnrichedRecord {
    /// Primary market code.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.ticker.symbol
    }
}

/// Enriched records keyed by primary market code.
pub type RecordMap = BTreeMap<Symbol, EnrichedRecord>;

// =============================================================================
// Correlator
// =============================================================================

/// Inputs of one correlation cycle.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationInput<'a> {
    /// Latest primary snapshot.
    pub primary: &'a HashMap<Symbol, TickerRecord>,
    /// Latest counterpart snapshot.
    pub counterpart: &'a HashMap<Symbol, TickerRecord>,
    /// Latest KRW/USD rate.
    pub fx_rate: Option<&'a FxRate>,
    /// Display names by primary market code.
    pub metadata: &'a HashMap<Symbol, AssetMetadata>,
}

/// Computes enriched records from two snapshots and the FX rate.
#[derive(Debug, Clone, Default)]
pub struct Correlator {
    mapper: SymbolMapper,
}

impl Correlator {
    /// Create a correlator with the given symbol mapper.
    #[must_use]
    pub const fn new(mapper: SymbolMapper) -> Self {
        Self { mapper }
    }

    /// Symbol mapper in use.
    #[must_use]
    pub const fn mapper(&self) -> &SymbolMapper {
        &self.mapper
    }

    /// Enrich every primary record. Either snapshot may be empty.
    #[must_use]
    pub fn correlate(&self, input: CorrelationInput<'_>) -> RecordMap {
        input
            .primary
            .values()
            .map(|ticker| (ticker.symbol.clone(), self.enrich(ticker, input)))
            .collect()
    }

    fn enrich(&self, ticker: &TickerRecord, input: CorrelationInput<'_>) -> EnrichedRecord {
        let metadata = input.metadata.get(&ticker.symbol);
        let counterpart_symbol = self.mapper.counterpart_symbol(&ticker.symbol);
        let counterpart = counterpart_symbol
            .as_ref()
            .and_then(|s| input.counterpart.get(s));

        let counterpart_price = counterpart.map(|c| c.trade_price);
        let counterpart_krw = counterpart_price
            .zip(input.fx_rate)
            .and_then(|(price, fx)| price.checked_mul(fx.base_price));

        let precision = price_precision(ticker.trade_price);

        EnrichedRecord {
            ticker: ticker.clone(),
            korean_name: metadata.map(|m| m.korean_name.clone()),
            english_name: metadata.map(|m| m.english_name.clone()),
            counterpart_symbol,
            counterpart_price,
            counterpart_price_krw: counterpart_krw
                .map(|krw| krw.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)),
            counterpart_volume: counterpart.map(|c| c.acc_trade_price_24h),
            premium: counterpart_krw.and_then(|krw| compute_premium(ticker.trade_price, krw)),
        }
    }
}

/// Premium of `primary_price` over an already-converted counterpart price.
///
/// Returns `None` when the primary price is zero or the arithmetic
/// overflows.
#[must_use]
pub fn compute_premium(primary_price: Decimal, counterpart_krw: Decimal) -> Option<Decimal> {
    if primary_price.is_zero() {
        return None;
    }

    let ratio = counterpart_krw.checked_div(primary_price)?;
    let premium = Decimal::ONE.checked_sub(ratio)?.checked_mul(Decimal::ONE_HUNDRED)?;

    Some(premium.round_dp_with_strategy(
        PREMIUM_DECIMAL_PLACES,
        RoundingStrategy::MidpointAwayFromZero,
    ))
}

/// Number of fractional digits a price is quoted with.
#[must_use]
pub fn price_precision(price: Decimal) -> u32 {
    price.normalize().scale()
}
