//! Market data orchestration service.
//!
//! [`MarketDataService`] is the control-flow hub of the crate: it owns
//! the ordered provider set and runs the fallback chain for every
//! lookup. It holds no mutable state of its own - providers are
//! injected `Arc` singletons shared across concurrent requests.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, warn};

use crate::errors::MarketDataError;
use crate::models::{Quote, SymbolMatch};
use crate::provider::QuoteProvider;

/// Longest symbol any upstream in the set accepts.
const MAX_SYMBOL_LEN: usize = 20;

/// Outbound-quota decision for one provider attempt.
#[derive(Clone, Copy, Debug)]
pub struct QuotaDecision {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// Seconds until the quota window frees up, when denied.
    pub retry_after_secs: u64,
}

impl QuotaDecision {
    /// A decision that always admits.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
        }
    }
}

/// Outbound quota check, consulted before every provider call.
///
/// Wired to the application's sliding-window rate limiter with
/// per-provider buckets; a denial is treated exactly like an upstream
/// rate limit. Kept as a function seam so this crate stays independent
/// of the limiter's home crate.
pub type ProviderQuota = Arc<dyn Fn(&str) -> QuotaDecision + Send + Sync>;

/// Provider orchestrator with fallback ordering and error
/// classification.
pub struct MarketDataService {
    providers: Vec<Arc<dyn QuoteProvider>>,
    default_provider: String,
    trending: Vec<String>,
    quota: Option<ProviderQuota>,
}

impl MarketDataService {
    /// Create a new service over the given provider set.
    ///
    /// `default_provider` is used when a caller does not name one
    /// (bulk and trending lookups always use it). `trending` is the
    /// fixed symbol set served by [`Self::get_trending`].
    pub fn new(
        providers: Vec<Arc<dyn QuoteProvider>>,
        default_provider: impl Into<String>,
        trending: Vec<String>,
    ) -> Self {
        Self {
            providers,
            default_provider: default_provider.into(),
            trending,
            quota: None,
        }
    }

    /// Attach an outbound quota check.
    pub fn with_quota(mut self, quota: ProviderQuota) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Ids of the configured providers, in registration order.
    pub fn provider_ids(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// The configured providers (for quota wiring at startup).
    pub fn providers(&self) -> &[Arc<dyn QuoteProvider>] {
        &self.providers
    }

    /// Fetch the latest quote for a symbol.
    ///
    /// Providers are tried in chain order: the preferred provider
    /// first, then - when `allow_fallback` is set - the remaining
    /// providers serving the same asset class, by priority. The first
    /// success wins and is tagged `is_fallback` when it did not come
    /// from the preferred provider. An error only surfaces once the
    /// chain is exhausted: the last provider's `RateLimited` or
    /// `SymbolNotFound` propagates as-is, anything else becomes an
    /// `Unavailable` aggregating every provider's message.
    pub async fn get_quote(
        &self,
        symbol: &str,
        preferred: Option<&str>,
        allow_fallback: bool,
    ) -> Result<Quote, MarketDataError> {
        let symbol = normalize_symbol(symbol)?;

        let preferred_id = preferred.unwrap_or(&self.default_provider);
        let first = self.provider_by_id(preferred_id).ok_or_else(|| {
            MarketDataError::Unavailable {
                reason: format!("no provider registered as '{}'", preferred_id),
            }
        })?;

        let chain = self.chain_for(first, allow_fallback);

        let mut failures: Vec<String> = Vec::with_capacity(chain.len());
        let mut last_error: Option<MarketDataError> = None;

        for (index, provider) in chain.iter().enumerate() {
            if let Some(quota) = &self.quota {
                let decision = quota(provider.id());
                if !decision.allowed {
                    debug!(
                        "Outbound quota denied '{}' for {}, retry in {}s",
                        provider.id(),
                        symbol,
                        decision.retry_after_secs
                    );
                    let error = MarketDataError::RateLimited {
                        provider: provider.id().to_string(),
                        retry_after_secs: decision.retry_after_secs,
                    };
                    failures.push(format!("{}: {}", provider.id(), error));
                    last_error = Some(error);
                    continue;
                }
            }

            match provider.fetch_quote(&symbol).await {
                Ok(mut quote) => {
                    quote.symbol = symbol.clone();
                    quote.is_fallback = index > 0;
                    if quote.is_fallback {
                        debug!(
                            "Quote for {} served by fallback provider '{}'",
                            symbol,
                            provider.id()
                        );
                    }
                    return Ok(quote);
                }
                Err(e) => {
                    debug!(
                        "Provider '{}' failed for {}: {}, {} provider(s) left",
                        provider.id(),
                        symbol,
                        e,
                        chain.len() - index - 1
                    );
                    failures.push(format!("{}: {}", provider.id(), e));
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(error @ MarketDataError::RateLimited { .. }) => Err(error),
            Some(MarketDataError::SymbolNotFound(_)) => {
                Err(MarketDataError::SymbolNotFound(symbol))
            }
            Some(_) => Err(MarketDataError::Unavailable {
                reason: failures.join("; "),
            }),
            None => Err(MarketDataError::Unavailable {
                reason: format!("no providers available for {}", symbol),
            }),
        }
    }

    /// Fetch quotes for several symbols, one chain run each.
    ///
    /// A failed symbol maps to `None`; one failure never aborts the
    /// batch.
    pub async fn get_bulk_quotes(&self, symbols: &[String]) -> HashMap<String, Option<Quote>> {
        let fetches = symbols.iter().map(|raw| async move {
            let key = raw.trim().to_uppercase();
            let result = self.get_quote(raw, None, true).await;
            (key, result)
        });

        let mut quotes = HashMap::with_capacity(symbols.len());
        for (symbol, result) in join_all(fetches).await {
            match result {
                Ok(quote) => {
                    quotes.insert(symbol, Some(quote));
                }
                Err(e) => {
                    warn!("Bulk quote failed for {}: {}", symbol, e);
                    quotes.insert(symbol, None);
                }
            }
        }
        quotes
    }

    /// Fetch quotes for the configured trending symbol set.
    pub async fn get_trending(&self) -> HashMap<String, Option<Quote>> {
        self.get_bulk_quotes(&self.trending).await
    }

    /// The trending symbol set this service is configured with.
    pub fn trending_symbols(&self) -> &[String] {
        &self.trending
    }

    /// Search for symbols across search-capable providers.
    ///
    /// Providers are tried by priority; the first successful response
    /// wins, even when empty.
    pub async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>, MarketDataError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MarketDataError::InvalidSymbol(
                "empty search query".to_string(),
            ));
        }

        let mut searchers: Vec<_> = self
            .providers
            .iter()
            .filter(|p| p.capabilities().supports_search)
            .collect();
        searchers.sort_by_key(|p| p.priority());

        let mut failures: Vec<String> = Vec::new();
        for provider in searchers {
            match provider.search(query).await {
                Ok(matches) => return Ok(matches),
                Err(e) => {
                    debug!("Search via '{}' failed: {}", provider.id(), e);
                    failures.push(format!("{}: {}", provider.id(), e));
                }
            }
        }

        Err(MarketDataError::Unavailable {
            reason: if failures.is_empty() {
                "no providers support symbol search".to_string()
            } else {
                failures.join("; ")
            },
        })
    }

    fn provider_by_id(&self, id: &str) -> Option<&Arc<dyn QuoteProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    /// Build the ordered chain for a request preferring `first`.
    ///
    /// Alternates are scoped to the preferred provider's primary asset
    /// class and ordered by priority.
    fn chain_for<'a>(
        &'a self,
        first: &'a Arc<dyn QuoteProvider>,
        allow_fallback: bool,
    ) -> Vec<&'a Arc<dyn QuoteProvider>> {
        let mut chain = vec![first];
        if allow_fallback {
            let class = first.capabilities().primary_class();
            let mut alternates: Vec<_> = self
                .providers
                .iter()
                .filter(|p| p.id() != first.id() && p.capabilities().serves(class))
                .collect();
            alternates.sort_by_key(|p| p.priority());
            chain.extend(alternates);
        }
        chain
    }
}

/// Trim, uppercase and validate a requested symbol.
fn normalize_symbol(raw: &str) -> Result<String, MarketDataError> {
    let symbol = raw.trim().to_uppercase();

    if symbol.is_empty() {
        return Err(MarketDataError::InvalidSymbol("empty symbol".to_string()));
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(MarketDataError::InvalidSymbol(format!(
            "symbol too long: {}",
            symbol
        )));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '=' | '^' | '/'))
    {
        return Err(MarketDataError::InvalidSymbol(symbol));
    }

    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetClass;
    use crate::provider::{ProviderCapabilities, RateLimit};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum MockBehavior {
        Succeed,
        NotFound,
        RateLimited,
        Unavailable,
    }

    struct MockProvider {
        id: &'static str,
        priority: u8,
        classes: &'static [AssetClass],
        behavior: MockBehavior,
        call_count: AtomicUsize,
    }

    impl MockProvider {
        fn new(id: &'static str, priority: u8, behavior: MockBehavior) -> Self {
            Self {
                id,
                priority,
                classes: &[AssetClass::Equity],
                behavior,
                call_count: AtomicUsize::new(0),
            }
        }

        fn crypto(id: &'static str, behavior: MockBehavior) -> Self {
            Self {
                classes: &[AssetClass::Crypto],
                ..Self::new(id, 5, behavior)
            }
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl QuoteProvider for MockProvider {
        fn id(&self) -> &'static str {
            self.id
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities {
                asset_classes: self.classes,
                supports_search: false,
            }
        }

        fn rate_limit(&self) -> RateLimit {
            RateLimit {
                requests_per_minute: 100,
            }
        }

        async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            match self.behavior {
                MockBehavior::Succeed => Ok(Quote::new(
                    symbol,
                    dec!(102.5),
                    "USD",
                    Utc::now(),
                    self.id,
                )),
                MockBehavior::NotFound => {
                    Err(MarketDataError::SymbolNotFound(symbol.to_string()))
                }
                MockBehavior::RateLimited => Err(MarketDataError::RateLimited {
                    provider: self.id.to_string(),
                    retry_after_secs: 30,
                }),
                MockBehavior::Unavailable => Err(MarketDataError::Unavailable {
                    reason: format!("{}: connection refused", self.id),
                }),
            }
        }
    }

    fn service_of(providers: Vec<Arc<dyn QuoteProvider>>) -> MarketDataService {
        MarketDataService::new(providers, "PRIMARY", vec![])
    }

    #[tokio::test]
    async fn test_preferred_success_is_not_fallback() {
        let primary = Arc::new(MockProvider::new("PRIMARY", 5, MockBehavior::Succeed));
        let service = service_of(vec![
            primary.clone(),
            Arc::new(MockProvider::new("ALTERNATE", 10, MockBehavior::Succeed)),
        ]);

        let quote = service.get_quote("aapl", None, true).await.unwrap();
        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.source, "PRIMARY");
        assert!(!quote.is_fallback);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let alternate = Arc::new(MockProvider::new("ALTERNATE", 10, MockBehavior::Succeed));
        let service = service_of(vec![
            Arc::new(MockProvider::new("PRIMARY", 5, MockBehavior::Succeed)),
            alternate.clone(),
        ]);

        service.get_quote("AAPL", None, true).await.unwrap();
        assert_eq!(alternate.calls(), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_preferred_falls_back() {
        let service = service_of(vec![
            Arc::new(MockProvider::new("PRIMARY", 5, MockBehavior::RateLimited)),
            Arc::new(MockProvider::new("ALTERNATE", 10, MockBehavior::Succeed)),
        ]);

        let quote = service.get_quote("AAPL", None, true).await.unwrap();
        assert_eq!(quote.source, "ALTERNATE");
        assert!(quote.is_fallback);
    }

    #[tokio::test]
    async fn test_rate_limited_last_provider_surfaces() {
        let service = service_of(vec![
            Arc::new(MockProvider::new("PRIMARY", 5, MockBehavior::Unavailable)),
            Arc::new(MockProvider::new("ALTERNATE", 10, MockBehavior::RateLimited)),
        ]);

        let err = service.get_quote("AAPL", None, true).await.unwrap_err();
        assert!(matches!(err, MarketDataError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_unknown_symbol_everywhere_is_not_found() {
        let service = service_of(vec![
            Arc::new(MockProvider::new("PRIMARY", 5, MockBehavior::NotFound)),
            Arc::new(MockProvider::new("ALTERNATE", 10, MockBehavior::NotFound)),
        ]);

        let err = service.get_quote("ZZZZINVALID", None, true).await.unwrap_err();
        assert!(matches!(err, MarketDataError::SymbolNotFound(_)));
    }

    #[tokio::test]
    async fn test_not_found_mid_chain_continues() {
        let service = service_of(vec![
            Arc::new(MockProvider::new("PRIMARY", 5, MockBehavior::NotFound)),
            Arc::new(MockProvider::new("ALTERNATE", 10, MockBehavior::Succeed)),
        ]);

        let quote = service.get_quote("AAPL", None, true).await.unwrap();
        assert_eq!(quote.source, "ALTERNATE");
        assert!(quote.is_fallback);
    }

    #[tokio::test]
    async fn test_all_unavailable_aggregates_messages() {
        let service = service_of(vec![
            Arc::new(MockProvider::new("PRIMARY", 5, MockBehavior::Unavailable)),
            Arc::new(MockProvider::new("ALTERNATE", 10, MockBehavior::Unavailable)),
        ]);

        let err = service.get_quote("AAPL", None, true).await.unwrap_err();
        match err {
            MarketDataError::Unavailable { reason } => {
                assert!(reason.contains("PRIMARY"));
                assert!(reason.contains("ALTERNATE"));
            }
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fallback_disallowed_stops_after_preferred() {
        let alternate = Arc::new(MockProvider::new("ALTERNATE", 10, MockBehavior::Succeed));
        let service = service_of(vec![
            Arc::new(MockProvider::new("PRIMARY", 5, MockBehavior::Unavailable)),
            alternate.clone(),
        ]);

        let err = service.get_quote("AAPL", None, false).await.unwrap_err();
        assert!(matches!(err, MarketDataError::Unavailable { .. }));
        assert_eq!(alternate.calls(), 0);
    }

    #[tokio::test]
    async fn test_chain_stays_within_asset_class() {
        let crypto = Arc::new(MockProvider::crypto("CRYPTO", MockBehavior::Succeed));
        let service = service_of(vec![
            Arc::new(MockProvider::new("PRIMARY", 5, MockBehavior::Unavailable)),
            crypto.clone(),
        ]);

        let err = service.get_quote("AAPL", None, true).await.unwrap_err();
        assert!(matches!(err, MarketDataError::Unavailable { .. }));
        assert_eq!(crypto.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_preferred_provider() {
        let service = service_of(vec![Arc::new(MockProvider::new(
            "PRIMARY",
            5,
            MockBehavior::Succeed,
        ))]);

        let err = service
            .get_quote("AAPL", Some("NOPE"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_invalid_symbol_rejected_before_providers() {
        let primary = Arc::new(MockProvider::new("PRIMARY", 5, MockBehavior::Succeed));
        let service = service_of(vec![primary.clone()]);

        let err = service.get_quote("  ", None, true).await.unwrap_err();
        assert!(matches!(err, MarketDataError::InvalidSymbol(_)));

        let err = service.get_quote("AA PL", None, true).await.unwrap_err();
        assert!(matches!(err, MarketDataError::InvalidSymbol(_)));

        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_bulk_quotes_tolerate_partial_failure() {
        struct PickyProvider;

        #[async_trait::async_trait]
        impl QuoteProvider for PickyProvider {
            fn id(&self) -> &'static str {
                "PRIMARY"
            }
            fn capabilities(&self) -> ProviderCapabilities {
                ProviderCapabilities {
                    asset_classes: &[AssetClass::Equity],
                    supports_search: false,
                }
            }
            async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
                if symbol == "ZZZZINVALID" {
                    Err(MarketDataError::SymbolNotFound(symbol.to_string()))
                } else {
                    Ok(Quote::new(symbol, dec!(100), "USD", Utc::now(), self.id()))
                }
            }
        }

        let service = service_of(vec![Arc::new(PickyProvider)]);
        let symbols = vec![
            "AAPL".to_string(),
            "ZZZZINVALID".to_string(),
            "MSFT".to_string(),
        ];

        let quotes = service.get_bulk_quotes(&symbols).await;
        assert_eq!(quotes.len(), 3);
        assert!(quotes["AAPL"].is_some());
        assert!(quotes["MSFT"].is_some());
        assert!(quotes["ZZZZINVALID"].is_none());
    }

    #[tokio::test]
    async fn test_trending_uses_configured_symbols() {
        let service = MarketDataService::new(
            vec![Arc::new(MockProvider::new(
                "PRIMARY",
                5,
                MockBehavior::Succeed,
            ))],
            "PRIMARY",
            vec!["AAPL".to_string(), "TSLA".to_string()],
        );

        let trending = service.get_trending().await;
        assert_eq!(trending.len(), 2);
        assert!(trending["AAPL"].is_some());
        assert!(trending["TSLA"].is_some());
    }

    #[tokio::test]
    async fn test_quota_denial_behaves_like_rate_limit() {
        let primary = Arc::new(MockProvider::new("PRIMARY", 5, MockBehavior::Succeed));
        let alternate = Arc::new(MockProvider::new("ALTERNATE", 10, MockBehavior::Succeed));
        let service = service_of(vec![primary.clone(), alternate.clone()]).with_quota(Arc::new(
            |provider: &str| {
                if provider == "PRIMARY" {
                    QuotaDecision {
                        allowed: false,
                        retry_after_secs: 12,
                    }
                } else {
                    QuotaDecision::allow()
                }
            },
        ));

        let quote = service.get_quote("AAPL", None, true).await.unwrap();
        assert_eq!(quote.source, "ALTERNATE");
        assert!(quote.is_fallback);
        assert_eq!(primary.calls(), 0);
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_symbol("gc=f").unwrap(), "GC=F");
        assert_eq!(normalize_symbol("BRK.B").unwrap(), "BRK.B");
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("WAY_TOO_LONG_FOR_ANY_UPSTREAM").is_err());
        assert!(normalize_symbol("AAPL'; DROP TABLE").is_err());
    }
}
