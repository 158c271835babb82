use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical price observation for a symbol from one provider at one
/// instant.
///
/// Quotes are created per fetch and never mutated; a later fetch for the
/// same symbol supersedes the earlier quote rather than updating it.
/// This is the shape that round-trips through the cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Uppercased symbol the quote was requested for.
    pub symbol: String,

    /// Last observed price. Positive whenever the provider knew one.
    pub price: Decimal,

    /// ISO currency code, or the source-native code when the upstream
    /// reports something non-standard.
    pub currency: String,

    /// Absolute change since the previous close, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_abs: Option<Decimal>,

    /// Percentage change since the previous close, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<Decimal>,

    /// Trading volume, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,

    /// Market capitalization, when reported (crypto providers mostly).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Decimal>,

    /// Upstream-reported observation time. Adapters substitute the fetch
    /// time when the upstream supplies none.
    pub observed_at: DateTime<Utc>,

    /// Provider id the quote came from (e.g. "YAHOO", "ALPHA_VANTAGE").
    pub source: String,

    /// True exactly when the winning provider differs from the one the
    /// caller asked for.
    #[serde(default)]
    pub is_fallback: bool,
}

impl Quote {
    /// Create a quote with the required fields only.
    pub fn new(
        symbol: impl Into<String>,
        price: Decimal,
        currency: impl Into<String>,
        observed_at: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            currency: currency.into(),
            change_abs: None,
            change_pct: None,
            volume: None,
            market_cap: None,
            observed_at,
            source: source.into(),
            is_fallback: false,
        }
    }
}
