//! Provider trait definition.
//!
//! Every upstream source implements [`QuoteProvider`]; the service
//! depends only on this trait, which is what lets tests substitute
//! fakes for real providers.

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{Quote, SymbolMatch};

use super::capabilities::{ProviderCapabilities, RateLimit};

/// A single upstream market data source.
///
/// Adapters translate their upstream's schema into the canonical
/// [`Quote`] and classify failures into the [`MarketDataError`]
/// taxonomy. They never implement fallback themselves - that belongs to
/// the service.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Unique identifier, a constant like "YAHOO" or "ALPHA_VANTAGE".
    fn id(&self) -> &'static str;

    /// Ordering within a fallback chain. Lower values = higher priority.
    fn priority(&self) -> u8 {
        10
    }

    /// What this provider can do.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Outbound quota this provider should be held to.
    fn rate_limit(&self) -> RateLimit {
        RateLimit::default()
    }

    /// Fetch the latest quote for a symbol.
    ///
    /// The symbol is already normalized (trimmed, uppercased) by the
    /// caller. Failures must be classified: `SymbolNotFound` when the
    /// upstream explicitly reports no such symbol, `RateLimited` on
    /// throttling, `Unavailable`/`ExternalApi` for everything else.
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketDataError>;

    /// Search for symbols matching the query.
    ///
    /// Default implementation reports the operation as unsupported.
    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, MarketDataError> {
        let _ = query;
        Err(MarketDataError::ExternalApi {
            provider: self.id().to_string(),
            message: "search not supported".to_string(),
        })
    }
}
