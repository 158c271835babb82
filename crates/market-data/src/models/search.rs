//! Search result models for symbol lookup.

use serde::{Deserialize, Serialize};

/// A single match from a ticker/symbol search.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMatch {
    /// Symbol/ticker (e.g. "AAPL", "SHOP.TO")
    pub symbol: String,

    /// Short display name (e.g. "Apple Inc")
    pub name: String,

    /// Exchange name or region the symbol trades on
    pub exchange: String,

    /// Asset type as reported by the provider (e.g. "EQUITY", "ETF")
    pub asset_type: String,

    /// Currency for the symbol, when the provider reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Relevance score from the provider (higher = better match)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl SymbolMatch {
    /// Create a new match with the required fields.
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        exchange: impl Into<String>,
        asset_type: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            exchange: exchange.into(),
            asset_type: asset_type.into(),
            currency: None,
            score: None,
        }
    }

    /// Set the currency.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Set the relevance score.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}
