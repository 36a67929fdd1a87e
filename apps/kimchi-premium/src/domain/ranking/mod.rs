//! Market Ranking
//!
//! Produces the ordered list of primary market codes shown to consumers:
//!
//! 1. Keep KRW-quoted markets whose code, Korean name or English name
//!    contains the search query (case-insensitive).
//! 2. Split into favorites and the rest.
//! 3. Stable-sort each part by the active key. Missing values go last in
//!    either direction.
//! 4. Favorites first.
//!
//! [`RankingEngine`] keeps the last list and only hands out a new one when
//! the content or order actually changed.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::correlation::{EnrichedRecord, RecordMap};
use super::ticker::{Symbol, is_krw_quoted};

// =============================================================================
// Criteria
// =============================================================================

/// Column the market list is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Market code.
    Symbol,
    /// Korean display name.
    KoreanName,
    /// English display name.
    EnglishName,
    /// Last trade price.
    TradePrice,
    /// 24h signed change rate.
    SignedChangeRate,
    /// 24h signed change amount.
    SignedChangePrice,
    /// 24h traded value in KRW.
    #[default]
    AccTradePrice24h,
    /// 24h traded volume.
    AccTradeVolume24h,
    /// Kimchi premium.
    Premium,
    /// Counterpart price converted to KRW.
    CounterpartPrice,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    #[default]
    Descending,
}

/// Search query plus active sort.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RankingCriteria {
    /// Substring filter. Empty matches everything.
    pub query: String,
    /// Active sort column.
    pub sort_key: SortKey,
    /// Active sort direction.
    pub direction: SortDirection,
}

/// Markets pinned to the top of the list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FavoriteSet {
    symbols: HashSet<Symbol>,
}

impl FavoriteSet {
    /// Build a set from stored favorites.
    #[must_use]
    pub fn from_symbols(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            symbols: symbols.into_iter().collect(),
        }
    }

    /// Pin or unpin a market. Returns true if membership changed.
    pub fn set(&mut self, symbol: &str, favorite: bool) -> bool {
        if favorite {
            self.symbols.insert(symbol.to_string())
        } else {
            self.symbols.remove(symbol)
        }
    }

    /// Returns true if the market is pinned.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// Number of pinned markets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns true if nothing is pinned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Text(String),
    Number(Decimal),
}

fn sort_value(record: &EnrichedRecord, key: SortKey) -> Option<SortValue> {
    let ticker = &record.ticker;
    match key {
        SortKey::Symbol => Some(SortValue::Text(ticker.symbol.to_lowercase())),
        SortKey::KoreanName => record
            .korean_name
            .as_deref()
            .map(|n| SortValue::Text(n.to_lowercase())),
        SortKey::EnglishName => record
            .english_name
            .as_deref()
            .map(|n| SortValue::Text(n.to_lowercase())),
        SortKey::TradePrice => Some(SortValue::Number(ticker.trade_price)),
        SortKey::SignedChangeRate => Some(SortValue::Number(ticker.signed_change_rate)),
        SortKey::SignedChangePrice => Some(SortValue::Number(ticker.signed_change_price)),
        SortKey::AccTradePrice24h => Some(SortValue::Number(ticker.acc_trade_price_24h)),
        SortKey::AccTradeVolume24h => Some(SortValue::Number(ticker.acc_trade_volume_24h)),
        SortKey::Premium => record.premium.map(SortValue::Number),
        SortKey::CounterpartPrice => record.counterpart_price_krw.map(SortValue::Number),
    }
}

fn compare(a: Option<&SortValue>, b: Option<&SortValue>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match direction {
            SortDirection::Ascending => a.cmp(b),
            SortDirection::Descending => b.cmp(a),
        },
    }
}

fn matches_query(record: &EnrichedRecord, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }

    std::iter::once(Some(record.ticker.symbol.as_str()))
        .chain([record.korean_name.as_deref(), record.english_name.as_deref()])
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Compute the ordered market list. Pure function of its inputs.
#[must_use]
pub fn ordered_symbols(
    records: &RecordMap,
    criteria: &RankingCriteria,
    favorites: &FavoriteSet,
) -> Vec<Symbol> {
    let needle = criteria.query.trim().to_lowercase();

    let (mut pinned, mut rest): (Vec<_>, Vec<_>) = records
        .values()
        .filter(|r| is_krw_quoted(r.symbol()) && matches_query(r, &needle))
        .map(|r| (sort_value(r, criteria.sort_key), r.symbol()))
        .partition(|(_, symbol)| favorites.contains(symbol));

    for part in [&mut pinned, &mut rest] {
        part.sort_by(|(a, _), (b, _)| compare(a.as_ref(), b.as_ref(), criteria.direction));
    }

    pinned
        .into_iter()
        .chain(rest)
        .map(|(_, symbol)| symbol.to_string())
        .collect()
}

// =============================================================================
// Ranking Engine
// =============================================================================

/// Shared, immutable ordered list.
pub type OrderedSymbols = Arc<Vec<Symbol>>;

/// Ranks markets and suppresses updates that would not change the list.
#[derive(Debug, Default)]
pub struct RankingEngine {
    current: OrderedSymbols,
}

impl RankingEngine {
    /// Create an engine with an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the list. Returns the new list only if it differs from the
    /// previous one in length or any element.
    pub fn rank(
        &mut self,
        records: &RecordMap,
        criteria: &RankingCriteria,
        favorites: &FavoriteSet,
    ) -> Option<OrderedSymbols> {
        let next = ordered_symbols(records, criteria, favorites);
        if next == *self.current {
            return None;
        }

        self.current = Arc::new(next);
        Some(Arc::clone(&self.current))
    }

    /// Last list handed out.
    #[must_use]
    pub fn current(&self) -> OrderedSymbols {
        Arc::clone(&self.current)
    }

    /// Empty the list. Returns true if it was non-empty.
    pub fn reset(&mut self) -> bool {
        if self.current.is_empty() {
            return false;
        }
        self.current = OrderedSymbols::default();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ticker::{ChangeDirection, Exchange, StreamType, TickerRecord};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn record(symbol: &str, english: &str, korean: &str, price: Decimal) -> EnrichedRecord {
        EnrichedRecord {
            ticker: TickerRecord {
                exchange: Exchange::Upbit,
                symbol: symbol.to_string(),
                trade_price: price,
                opening_price: price,
                high_price: price,
                low_price: price,
                change: ChangeDirection::Even,
                signed_change_price: Decimal::ZERO,
                signed_change_rate: Decimal::ZERO,
                acc_trade_volume_24h: Decimal::ONE,
                acc_trade_price_24h: price,
                highest_52_week_price: None,
                lowest_52_week_price: None,
                timestamp: 0,
                stream_type: StreamType::Realtime,
            },
            korean_name: Some(korean.to_string()),
            english_name: Some(english.to_string()),
            counterpart_symbol: None,
            counterpart_price: None,
            counterpart_price_krw: None,
            counterpart_volume: None,
            premium: None,
        }
    }

    fn sample() -> RecordMap {
        [
            record("KRW-BTC", "Bitcoin", "비트코인", dec!(90000000)),
            record("KRW-ETH", "Ethereum", "이더리움", dec!(4000000)),
            record("KRW-XRP", "Ripple", "리플", dec!(800)),
            record("BTC-ETH", "Ethereum", "이더리움", dec!(0.05)),
        ]
        .into_iter()
        .map(|r| (r.symbol().to_string(), r))
        .collect()
    }

    fn criteria(query: &str, sort_key: SortKey, direction: SortDirection) -> RankingCriteria {
        RankingCriteria {
            query: query.to_string(),
            sort_key,
            direction,
        }
    }

    #[test]
    fn empty_query_lists_every_krw_market() {
        let list = ordered_symbols(&sample(), &RankingCriteria::default(), &FavoriteSet::default());
        assert_eq!(list, vec!["KRW-BTC", "KRW-ETH", "KRW-XRP"]);
    }

    #[test_case("eth", &["KRW-ETH"] ; "symbol code")]
    #[test_case("RIPPLE", &["KRW-XRP"] ; "english name any case")]
    #[test_case("비트", &["KRW-BTC"] ; "korean name")]
    #[test_case("coin", &["KRW-BTC"] ; "english substring")]
    #[test_case("nothing", &[] ; "no match")]
    fn query_filter(query: &str, expected: &[&str]) {
        let list = ordered_symbols(
            &sample(),
            &criteria(query, SortKey::TradePrice, SortDirection::Descending),
            &FavoriteSet::default(),
        );
        assert_eq!(list, expected);
    }

    #[test]
    fn favorites_come_first() {
        let favorites = FavoriteSet::from_symbols(["KRW-XRP".to_string()]);
        let list = ordered_symbols(
            &sample(),
            &criteria("", SortKey::TradePrice, SortDirection::Descending),
            &favorites,
        );
        assert_eq!(list, vec!["KRW-XRP", "KRW-BTC", "KRW-ETH"]);
    }

    #[test]
    fn string_keys_ignore_case() {
        let mut records = sample();
        records.insert(
            "KRW-ADA".to_string(),
            record("KRW-ADA", "cardano", "에이다", dec!(500)),
        );
        let list = ordered_symbols(
            &records,
            &criteria("", SortKey::EnglishName, SortDirection::Ascending),
            &FavoriteSet::default(),
        );
        assert_eq!(list, vec!["KRW-BTC", "KRW-ADA", "KRW-ETH", "KRW-XRP"]);
    }

    #[test_case(SortDirection::Ascending ; "ascending")]
    #[test_case(SortDirection::Descending ; "descending")]
    fn missing_values_sort_last(direction: SortDirection) {
        let mut records = sample();
        if let Some(r) = records.get_mut("KRW-ETH") {
            r.premium = Some(dec!(1.5));
        }
        if let Some(r) = records.get_mut("KRW-XRP") {
            r.premium = Some(dec!(-0.5));
        }

        let list = ordered_symbols(
            &records,
            &criteria("", SortKey::Premium, direction),
            &FavoriteSet::default(),
        );
        assert_eq!(list.last().map(String::as_str), Some("KRW-BTC"));
    }

    #[test]
    fn equal_keys_keep_listing_order() {
        let records: RecordMap = ["KRW-C", "KRW-A", "KRW-B"]
            .into_iter()
            .map(|s| (s.to_string(), record(s, s, s, dec!(1))))
            .collect();
        let list = ordered_symbols(
            &records,
            &criteria("", SortKey::TradePrice, SortDirection::Descending),
            &FavoriteSet::default(),
        );
        assert_eq!(list, vec!["KRW-A", "KRW-B", "KRW-C"]);
    }

    #[test]
    fn engine_suppresses_unchanged_list() {
        let mut engine = RankingEngine::new();
        let records = sample();
        let criteria = RankingCriteria::default();
        let favorites = FavoriteSet::default();

        let first = engine.rank(&records, &criteria, &favorites);
        assert!(first.is_some());
        assert!(engine.rank(&records, &criteria, &favorites).is_none());

        let flipped = RankingCriteria {
            direction: SortDirection::Ascending,
            ..criteria
        };
        assert!(engine.rank(&records, &flipped, &favorites).is_some());
        assert_eq!(engine.current().first().map(String::as_str), Some("KRW-XRP"));
    }

    #[test]
    fn reset_empties_once() {
        let mut engine = RankingEngine::new();
        engine.rank(&sample(), &RankingCriteria::default(), &FavoriteSet::default());
        assert!(engine.reset());
        assert!(!engine.reset());
        assert!(engine.current().is_empty());
    }

    #[test]
    fn favorite_set_membership() {
        let mut favorites = FavoriteSet::default();
        assert!(favorites.set("KRW-BTC", true));
        assert!(!favorites.set("KRW-BTC", true));
        assert!(favorites.contains("KRW-BTC"));
        assert!(favorites.set("KRW-BTC", false));
        assert!(favorites.is_empty());
    }

    fn arb_records() -> impl Strategy<Value = (RecordMap, FavoriteSet)> {
        prop::collection::vec(("[A-Z]{2,5}", 0u32..1_000_000, any::<bool>()), 0..30).prop_map(
            |entries| {
                let mut records = RecordMap::new();
                let mut favorites = FavoriteSet::default();
                for (base, price, favorite) in entries {
                    let symbol = format!("KRW-{base}");
                    records.insert(
                        symbol.clone(),
                        record(&symbol, &base, &base, Decimal::from(price)),
                    );
                    favorites.set(&symbol, favorite);
                }
                (records, favorites)
            },
        )
    }

    proptest! {
        #[test]
        fn favorites_precede_non_favorites((records, favorites) in arb_records()) {
            let list = ordered_symbols(&records, &RankingCriteria::default(), &favorites);
            let first_regular = list.iter().position(|s| !favorites.contains(s));
            if let Some(split) = first_regular {
                prop_assert!(list[split..].iter().all(|s| !favorites.contains(s)));
            }
            prop_assert_eq!(list.len(), records.len());
        }

        #[test]
        fn ranking_is_idempotent((records, favorites) in arb_records()) {
            let mut engine = RankingEngine::new();
            let criteria = RankingCriteria::default();
            let first = engine.rank(&records, &criteria, &favorites);
            prop_assert_eq!(first.is_some(), !records.is_empty());
            prop_assert!(engine.rank(&records, &criteria, &favorites).is_none());
        }

        #[test]
        fn descending_prices_are_monotonic((records, _favorites) in arb_records()) {
            let list = ordered_symbols(
                &records,
                &RankingCriteria::default(),
                &FavoriteSet::default(),
            );
            let prices: Vec<Decimal> = list
                .iter()
                .filter_map(|s| records.get(s))
                .map(|r| r.ticker.acc_trade_price_24h)
                .collect();
            prop_assert!(prices.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}
