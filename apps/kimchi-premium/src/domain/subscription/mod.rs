//! Subscription Specifications
//!
//! Describes what one exchange stream should deliver: the full ticker
//! symbol list, the (usually single) trade-channel symbol list, and the
//! message format. A specification is validated once, when a connection is
//! asked to use it; every (re)connect then sends exactly one subscription
//! request built from it.

use serde::{Deserialize, Serialize};

use super::ticker::Symbol;

// =============================================================================
// Message Format
// =============================================================================

/// Field naming requested from the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageFormat {
    /// Abbreviated field names (`tp`, `cd`, ...).
    #[default]
    Simple,
    /// Full field names (`trade_price`, `code`, ...).
    Default,
}

impl MessageFormat {
    /// Parse a format name, falling back to [`MessageFormat::Simple`].
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "DEFAULT" => Self::Default,
            _ => Self::Simple,
        }
    }

    /// Wire name of the format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "SIMPLE",
            Self::Default => "DEFAULT",
        }
    }
}

// =============================================================================
// Subscription Spec
// =============================================================================

/// Everything one stream subscription asks for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriptionSpec {
    /// Symbols on the ticker channel. Must not be empty.
    pub ticker_symbols: Vec<Symbol>,
    /// Symbols on the trade channel. Empty means no trade channel.
    pub trade_symbols: Vec<Symbol>,
    /// Requested message format.
    pub format: MessageFormat,
}

impl SubscriptionSpec {
    /// Create a ticker-only specification.
    #[must_use]
    pub fn tickers(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            ticker_symbols: symbols.into_iter().collect(),
            trade_symbols: Vec::new(),
            format: MessageFormat::default(),
        }
    }

    /// Set the trade-channel symbols.
    #[must_use]
    pub fn with_trades(mut self, symbols: impl IntoIterator<Item = Symbol>) -> Self {
        self.trade_symbols = symbols.into_iter().collect();
        self
    }

    /// Set the message format.
    #[must_use]
    pub const fn with_format(mut self, format: MessageFormat) -> Self {
        self.format = format;
        self
    }

    /// Returns true if a trade channel is requested.
    #[must_use]
    pub fn has_trades(&self) -> bool {
        !self.trade_symbols.is_empty()
    }

    /// Check the specification before it is used for a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the ticker list is empty or any symbol is blank.
    pub fn validate(&self) -> Result<(), SubscriptionError> {
        if self.ticker_symbols.is_empty() {
            return Err(SubscriptionError::EmptyTickerSymbols);
        }

        if let Some(index) = self
            .ticker_symbols
            .iter()
            .chain(&self.trade_symbols)
            .position(|s| s.trim().is_empty())
        {
            return Err(SubscriptionError::BlankSymbol(index));
        }

        Ok(())
    }

    /// Copy of this specification with a different trade list.
    #[must_use]
    pub fn replace_trades(&self, symbols: Vec<Symbol>) -> Self {
        Self {
            ticker_symbols: self.ticker_symbols.clone(),
            trade_symbols: symbols,
            format: self.format,
        }
    }
}

/// Invalid subscription specification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// No ticker symbols were given.
    #[error("subscription requires at least one ticker symbol")]
    EmptyTickerSymbols,
    /// A symbol at the given position is empty or whitespace.
    #[error("symbol at position {0} is blank")]
    BlankSymbol(usize),
}
