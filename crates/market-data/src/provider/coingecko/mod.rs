//! CoinGecko cryptocurrency provider.
//!
//! Uses the `simple/price` endpoint with market cap, 24h volume and 24h
//! change included. CoinGecko keys prices by coin id ("bitcoin"), not
//! ticker; the adapter follows the original convention of using the
//! lowercased symbol as the id, so callers pass "BITCOIN" or "bitcoin"
//! rather than "BTC".

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::Client;
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{AssetClass, Quote, SymbolMatch};
use crate::provider::{ProviderCapabilities, QuoteProvider, RateLimit};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";
const PROVIDER_ID: &str = "COINGECKO";
const VS_CURRENCY: &str = "usd";

/// CoinGecko market data provider.
pub struct CoinGeckoProvider {
    client: Client,
    api_key: String,
}

/// One coin's entry in a simple/price response, e.g.
/// `{"usd": 64123.0, "usd_market_cap": ..., "usd_24h_vol": ..., "usd_24h_change": ...}`
type PriceEntry = HashMap<String, f64>;

/// /search response envelope
#[derive(Debug, Deserialize)]
struct SearchResponse {
    coins: Vec<SearchCoin>,
}

#[derive(Debug, Deserialize)]
struct SearchCoin {
    id: String,
    name: String,
    symbol: String,
}

impl CoinGeckoProvider {
    /// Create a new CoinGecko provider with the given API key.
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, api_key }
    }

    async fn fetch(&self, path: &str, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        let url = reqwest::Url::parse_with_params(&format!("{}/{}", BASE_URL, path), params)
            .map_err(|e| MarketDataError::Unavailable {
                reason: format!("{}: failed to build URL: {}", PROVIDER_ID, e),
            })?;

        debug!("CoinGecko request: {}", url.as_str());

        let response = self
            .client
            .get(url)
            .header("x-cg-demo-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| {
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
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID.to_string(),
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            return Err(MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        response
            .text()
            .await
            .map_err(|e| MarketDataError::Unavailable {
                reason: format!("{}: {}", PROVIDER_ID, e),
            })
    }

    /// Build a canonical quote from one coin's price entry.
    fn entry_to_quote(symbol: &str, entry: &PriceEntry) -> Result<Quote, MarketDataError> {
        let price = entry
            .get(VS_CURRENCY)
            .copied()
            .and_then(Decimal::from_f64)
            .ok_or_else(|| MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: format!("no {} price for {}", VS_CURRENCY, symbol),
            })?;

        // CoinGecko does not report an observation time on this
        // endpoint; the fetch time stands in.
        let mut quote = Quote::new(
            symbol,
            price,
            VS_CURRENCY.to_uppercase(),
            Utc::now(),
            PROVIDER_ID,
        );
        quote.market_cap = entry
            .get(&format!("{}_market_cap", VS_CURRENCY))
            .copied()
            .and_then(Decimal::from_f64);
        quote.volume = entry
            .get(&format!("{}_24h_vol", VS_CURRENCY))
            .copied()
            .and_then(Decimal::from_f64);
        quote.change_pct = entry
            .get(&format!("{}_24h_change", VS_CURRENCY))
            .copied()
            .and_then(Decimal::from_f64);

        Ok(quote)
    }
}

#[async_trait]
impl QuoteProvider for CoinGeckoProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        5
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            asset_classes: &[AssetClass::Crypto],
            supports_search: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        // Demo tier: ~30 calls per minute
        RateLimit {
            requests_per_minute: 30,
        }
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let coin_id = symbol.to_lowercase();
        let params = [
            ("ids", coin_id.as_str()),
            ("vs_currencies", VS_CURRENCY),
            ("include_market_cap", "true"),
            ("include_24hr_vol", "true"),
            ("include_24hr_change", "true"),
        ];

        let text = self.fetch("simple/price", &params).await?;
        let response: HashMap<String, PriceEntry> =
            serde_json::from_str(&text).map_err(|e| MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: format!("failed to parse response: {}", e),
            })?;

        let entry = response
            .get(&coin_id)
            .ok_or_else(|| MarketDataError::SymbolNotFound(symbol.to_string()))?;

        Self::entry_to_quote(symbol, entry)
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, MarketDataError> {
        let params = [("query", query)];

        let text = self.fetch("search", &params).await?;
        let response: SearchResponse =
            serde_json::from_str(&text).map_err(|e| MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: format!("failed to parse search response: {}", e),
            })?;

        let matches = response
            .coins
            .into_iter()
            .map(|coin| {
                SymbolMatch::new(coin.id, coin.name, "CoinGecko", "CRYPTOCURRENCY")
                    .with_currency(coin.symbol.to_uppercase())
            })
            .collect();

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(pairs: &[(&str, f64)]) -> PriceEntry {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_entry_to_quote_maps_fields() {
        let entry = entry(&[
            ("usd", 64123.0),
            ("usd_market_cap", 1_260_000_000_000.0),
            ("usd_24h_vol", 35_000_000_000.0),
            ("usd_24h_change", -2.1),
        ]);

        let quote = CoinGeckoProvider::entry_to_quote("BITCOIN", &entry).unwrap();
        assert_eq!(quote.price, dec!(64123));
        assert_eq!(quote.currency, "USD");
        assert!(quote.market_cap.is_some());
        assert!(quote.volume.is_some());
        assert_eq!(quote.change_pct, Some(dec!(-2.1)));
    }

    #[test]
    fn test_entry_without_price_is_an_error() {
        let entry = entry(&[("usd_market_cap", 1.0)]);
        let err = CoinGeckoProvider::entry_to_quote("BITCOIN", &entry).unwrap_err();
        assert!(matches!(err, MarketDataError::ExternalApi { .. }));
    }

    #[test]
    fn test_missing_coin_id_is_not_found() {
        let response: HashMap<String, PriceEntry> =
            serde_json::from_str(r#"{"bitcoin": {"usd": 64123.0}}"#).unwrap();
        assert!(response.get("dogecoin").is_none());
        assert!(response.get("bitcoin").is_some());
    }
}
