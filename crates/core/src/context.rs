//! Composition root.
//!
//! Everything is built here, explicitly, and handed out as `Arc`
//! singletons - no module-level globals. The API layer constructs one
//! [`AppContext`] at startup and injects it into its handlers.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use tokio::task::JoinHandle;

use crate::cache::CacheStore;
use crate::limits::{RateDecision, RateLimiter, RatePolicy};
use crate::quotes::QuoteService;
use crate::scheduler::RefreshScheduler;
use crate::settings::Settings;
use crate::watchlist::{StaticWatchlist, WatchlistSource};
use quotefolio_market_data::{
    AlphaVantageProvider, CoinGeckoProvider, FrankfurterProvider, MarketDataService,
    MetalPriceProvider, QuotaDecision, QuoteProvider, YahooProvider,
};

/// The assembled service graph.
pub struct AppContext {
    pub settings: Settings,
    pub cache: Arc<CacheStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub market_data: Arc<MarketDataService>,
    pub quotes: Arc<QuoteService>,
}

impl AppContext {
    /// Build the full service graph from settings.
    ///
    /// An unreachable cache backend degrades to the in-memory store; a
    /// missing provider key disables that provider. Neither is fatal.
    pub async fn initialize(settings: Settings) -> Self {
        let cache = match CacheStore::redis(&settings.redis_url).await {
            Ok(store) => {
                info!("Cache backend connected: {}", settings.redis_url);
                Arc::new(store)
            }
            Err(e) => {
                warn!(
                    "Cache backend unreachable ({}), degrading to in-memory store",
                    e
                );
                Arc::new(CacheStore::in_memory())
            }
        };

        let rate_limiter = Arc::new(RateLimiter::new());
        let watchlist: Arc<dyn WatchlistSource> = Arc::new(StaticWatchlist::default());

        let market_data = MarketDataService::new(
            build_providers(&settings),
            settings.default_provider.clone(),
            watchlist.trending_symbols(),
        );
        info!(
            "Configured providers: {}",
            market_data.provider_ids().join(", ")
        );

        // Hold each provider to its declared outbound quota through the
        // shared limiter
        let quota_policies: HashMap<String, RatePolicy> = market_data
            .providers()
            .iter()
            .map(|p| {
                (
                    p.id().to_string(),
                    RatePolicy::per_minute(p.rate_limit().requests_per_minute as usize),
                )
            })
            .collect();
        let quota_limiter = Arc::clone(&rate_limiter);
        let market_data = Arc::new(market_data.with_quota(Arc::new(move |provider_id: &str| {
            let policy = quota_policies
                .get(provider_id)
                .copied()
                .unwrap_or(RatePolicy::per_minute(60));
            let decision = quota_limiter.allow_provider(provider_id, policy);
            QuotaDecision {
                allowed: decision.allowed,
                retry_after_secs: decision.retry_after_secs,
            }
        })));

        let quotes = Arc::new(QuoteService::new(
            Arc::clone(&market_data),
            Arc::clone(&cache),
            watchlist,
            settings.quote_ttl(),
            settings.trending_ttl(),
        ));

        Self {
            settings,
            cache,
            rate_limiter,
            market_data,
            quotes,
        }
    }

    /// Start the background refresh jobs.
    pub fn start_scheduler(&self) -> Vec<JoinHandle<()>> {
        RefreshScheduler::new(
            Arc::clone(&self.quotes),
            Arc::clone(&self.rate_limiter),
            self.settings.hot_refresh_interval(),
            self.settings.scheduler_initial_delay(),
        )
        .start()
    }

    /// Login rate-limit check for one identity. The API layer maps a
    /// denial to 429 with a Retry-After header.
    pub fn allow_login(&self, identity: &str) -> RateDecision {
        self.rate_limiter
            .allow_login(identity, self.settings.login_policy())
    }

    /// General API rate-limit check for one identity.
    pub fn allow_api(&self, identity: &str) -> RateDecision {
        self.rate_limiter
            .allow_api(identity, self.settings.api_policy())
    }
}

/// Instantiate every provider the settings carry credentials for.
fn build_providers(settings: &Settings) -> Vec<Arc<dyn QuoteProvider>> {
    let mut providers: Vec<Arc<dyn QuoteProvider>> = Vec::new();

    if let Some(key) = &settings.alpha_vantage_api_key {
        providers.push(Arc::new(AlphaVantageProvider::new(key.clone())));
    } else {
        info!("ALPHA_VANTAGE_API_KEY not set, provider disabled");
    }

    match YahooProvider::new() {
        Ok(provider) => providers.push(Arc::new(provider)),
        Err(e) => warn!("Yahoo provider unavailable: {}", e),
    }

    if let Some(key) = &settings.coingecko_api_key {
        providers.push(Arc::new(CoinGeckoProvider::new(key.clone())));
    } else {
        info!("COINGECKO_API_KEY not set, provider disabled");
    }

    providers.push(Arc::new(FrankfurterProvider::new()));

    if let Some(key) = &settings.metal_price_api_key {
        providers.push(Arc::new(MetalPriceProvider::new(key.clone())));
    } else {
        info!("METAL_PRICE_API_KEY not set, provider disabled");
    }

    providers
}
