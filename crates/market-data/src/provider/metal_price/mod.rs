//! Metal Price API provider for commodity (precious metal) quotes.
//!
//! Supported symbols: XAU (gold), XAG (silver), XPT (platinum),
//! XPD (palladium). The API reports how many troy ounces one USD buys,
//! so the per-ounce price is the reciprocal rate.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use num_traits::FromPrimitive;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{AssetClass, Quote};
use crate::provider::{ProviderCapabilities, QuoteProvider, RateLimit};

/// Supported metal symbols
const SUPPORTED_METALS: &[&str] = &["XAU", "XAG", "XPT", "XPD"];

const BASE_URL: &str = "https://api.metalpriceapi.com/v1/latest";
const PROVIDER_ID: &str = "METAL_PRICE_API";
const QUOTE_CURRENCY: &str = "USD";

/// API response from Metal Price API
#[derive(Debug, Deserialize)]
struct MetalPriceResponse {
    /// Whether the request was successful
    success: bool,
    /// Unix timestamp of the quote
    timestamp: Option<i64>,
    /// Rates for requested metals (1 USD = rate troy ounces)
    #[serde(default)]
    rates: HashMap<String, f64>,
}

/// Metal Price API commodity provider.
pub struct MetalPriceProvider {
    client: Client,
    api_key: String,
}

impl MetalPriceProvider {
    /// Create a new Metal Price API provider with the given API key.
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, api_key }
    }

    /// Check if the given symbol is a supported metal.
    fn is_supported_metal(symbol: &str) -> bool {
        SUPPORTED_METALS.contains(&symbol)
    }
}

#[async_trait]
impl QuoteProvider for MetalPriceProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        5
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            asset_classes: &[AssetClass::Commodity],
            supports_search: false,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 100,
        }
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        if !Self::is_supported_metal(symbol) {
            return Err(MarketDataError::SymbolNotFound(symbol.to_string()));
        }

        let url = format!(
            "{}?api_key={}&base={}&currencies={}",
            BASE_URL, self.api_key, QUOTE_CURRENCY, symbol
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                MarketDataError::Unavailable {
                    reason: format!("{}: request timed out", PROVIDER_ID),
                }
            } else {
                MarketDataError::Unavailable {
                    reason: format!("{}: {}", PROVIDER_ID, e),
                }
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID.to_string(),
                retry_after_secs: 60,
            });
        }
        if !status.is_success() {
            return Err(MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        let metal_resp: MetalPriceResponse =
            response
                .json()
                .await
                .map_err(|e| MarketDataError::ExternalApi {
                    provider: PROVIDER_ID.to_string(),
                    message: format!("failed to parse response: {}", e),
                })?;

        if !metal_resp.success {
            return Err(MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: "API request failed".to_string(),
            });
        }

        let rate = metal_resp
            .rates
            .get(symbol)
            .copied()
            .ok_or_else(|| MarketDataError::SymbolNotFound(symbol.to_string()))?;

        // 1 USD = rate troy ounces, so price per ounce = 1 / rate
        if rate == 0.0 {
            return Err(MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: "invalid rate (zero)".to_string(),
            });
        }

        let price = Decimal::from_f64(1.0 / rate).ok_or_else(|| MarketDataError::ExternalApi {
            provider: PROVIDER_ID.to_string(),
            message: format!("unusable rate {} for {}", rate, symbol),
        })?;

        let observed_at = metal_resp
            .timestamp
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now);

        Ok(Quote::new(
            symbol,
            price,
            QUOTE_CURRENCY,
            observed_at,
            PROVIDER_ID,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported_metal() {
        assert!(MetalPriceProvider::is_supported_metal("XAU"));
        assert!(MetalPriceProvider::is_supported_metal("XAG"));
        assert!(MetalPriceProvider::is_supported_metal("XPT"));
        assert!(MetalPriceProvider::is_supported_metal("XPD"));
        assert!(!MetalPriceProvider::is_supported_metal("AAPL"));
        assert!(!MetalPriceProvider::is_supported_metal("BTC"));
    }

    #[test]
    fn test_provider_identity() {
        let provider = MetalPriceProvider::new("test_key".to_string());
        assert_eq!(provider.id(), "METAL_PRICE_API");
        assert_eq!(
            provider.capabilities().primary_class(),
            AssetClass::Commodity
        );
        assert!(!provider.capabilities().supports_search);
    }

    #[test]
    fn test_response_parses() {
        let text = r#"{"success":true,"base":"USD","timestamp":1704470400,"rates":{"XAU":0.00049}}"#;
        let response: MetalPriceResponse = serde_json::from_str(text).unwrap();
        assert!(response.success);
        assert_eq!(response.rates.get("XAU"), Some(&0.00049));
    }
}
