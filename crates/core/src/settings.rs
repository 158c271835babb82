//! Environment-driven configuration.
//!
//! Everything has a safe default; the only values with no default are
//! the provider API keys, and a missing key disables that provider
//! rather than failing startup.

use std::env;
use std::time::Duration;

use crate::limits::RatePolicy;

/// Runtime configuration for the market data core.
#[derive(Clone, Debug)]
pub struct Settings {
    // Provider credentials (a missing key disables the provider)
    pub alpha_vantage_api_key: Option<String>,
    pub coingecko_api_key: Option<String>,
    pub metal_price_api_key: Option<String>,

    /// Provider used when a caller does not name one.
    pub default_provider: String,

    /// Cache backend address.
    pub redis_url: String,

    /// TTL for individually fetched and hot-refreshed quotes (seconds).
    pub quote_ttl_secs: u64,
    /// TTL for trending entries (seconds).
    pub trending_ttl_secs: u64,

    /// Interval between hot-symbol refresh runs (seconds).
    pub hot_refresh_interval_secs: u64,
    /// Delay before the first scheduled refresh (seconds).
    pub scheduler_initial_delay_secs: u64,

    // Rate limit policy numbers
    pub login_limit: usize,
    pub login_window_secs: u64,
    pub api_limit: usize,
    pub api_window_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            alpha_vantage_api_key: None,
            coingecko_api_key: None,
            metal_price_api_key: None,
            default_provider: "YAHOO".to_string(),
            redis_url: "redis://localhost:6379/0".to_string(),
            quote_ttl_secs: 300,
            trending_ttl_secs: 3600,
            hot_refresh_interval_secs: 300,
            scheduler_initial_delay_secs: 60,
            login_limit: 5,
            login_window_secs: 900,
            api_limit: 100,
            api_window_secs: 60,
        }
    }
}

impl Settings {
    /// Load configuration from environment variables with safe defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            alpha_vantage_api_key: non_empty(env::var("ALPHA_VANTAGE_API_KEY").ok()),
            coingecko_api_key: non_empty(env::var("COINGECKO_API_KEY").ok()),
            metal_price_api_key: non_empty(env::var("METAL_PRICE_API_KEY").ok()),

            default_provider: non_empty(env::var("DEFAULT_PROVIDER").ok())
                .unwrap_or(defaults.default_provider),

            redis_url: non_empty(env::var("REDIS_URL").ok()).unwrap_or(defaults.redis_url),

            quote_ttl_secs: parsed("QUOTE_CACHE_TTL_SECS", defaults.quote_ttl_secs),
            trending_ttl_secs: parsed("TRENDING_CACHE_TTL_SECS", defaults.trending_ttl_secs),

            hot_refresh_interval_secs: parsed(
                "HOT_REFRESH_INTERVAL_SECS",
                defaults.hot_refresh_interval_secs,
            ),
            scheduler_initial_delay_secs: parsed(
                "SCHEDULER_INITIAL_DELAY_SECS",
                defaults.scheduler_initial_delay_secs,
            ),

            login_limit: parsed("LOGIN_RATE_LIMIT", defaults.login_limit),
            login_window_secs: parsed("LOGIN_RATE_WINDOW_SECS", defaults.login_window_secs),
            api_limit: parsed("API_RATE_LIMIT", defaults.api_limit),
            api_window_secs: parsed("API_RATE_WINDOW_SECS", defaults.api_window_secs),
        }
    }

    /// Login policy (default: 5 attempts per 15 minutes).
    pub fn login_policy(&self) -> RatePolicy {
        RatePolicy::new(self.login_limit, self.login_window_secs)
    }

    /// General API policy (default: 100 requests per minute).
    pub fn api_policy(&self) -> RatePolicy {
        RatePolicy::new(self.api_limit, self.api_window_secs)
    }

    pub fn quote_ttl(&self) -> Duration {
        Duration::from_secs(self.quote_ttl_secs)
    }

    pub fn trending_ttl(&self) -> Duration {
        Duration::from_secs(self.trending_ttl_secs)
    }

    pub fn hot_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.hot_refresh_interval_secs)
    }

    pub fn scheduler_initial_delay(&self) -> Duration {
        Duration::from_secs(self.scheduler_initial_delay_secs)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policies() {
        let settings = Settings::default();

        let login = settings.login_policy();
        assert_eq!(login.limit, 5);
        assert_eq!(login.window, Duration::from_secs(900));

        let api = settings.api_policy();
        assert_eq!(api.limit, 100);
        assert_eq!(api.window, Duration::from_secs(60));
    }

    #[test]
    fn test_default_ttls() {
        let settings = Settings::default();
        assert_eq!(settings.quote_ttl(), Duration::from_secs(300));
        assert_eq!(settings.trending_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_non_empty_filters_blank_values() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(Some(" key ".to_string())), Some("key".to_string()));
        assert_eq!(non_empty(None), None);
    }
}
