//! Alpha Vantage market data provider implementation.
//!
//! Quotes come from the GLOBAL_QUOTE endpoint, symbol search from
//! SYMBOL_SEARCH. The free tier is limited to a handful of calls per
//! minute, and the API reports throttling inside an otherwise-200
//! response ("Note"/"Information" payloads), so error classification
//! has to look at the body, not just the status code.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{AssetClass, Quote, SymbolMatch};
use crate::provider::{ProviderCapabilities, QuoteProvider, RateLimit};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: &str = "ALPHA_VANTAGE";

/// Fallback Retry-After when the API throttles without saying for how long.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Alpha Vantage equities provider.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
}

// ============================================================================
// Response structures for the Alpha Vantage API
// ============================================================================

/// GLOBAL_QUOTE response envelope
#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: Option<String>,
    #[serde(rename = "09. change")]
    change: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

/// SYMBOL_SEARCH response envelope
#[derive(Debug, Deserialize)]
struct SymbolSearchResponse {
    #[serde(rename = "bestMatches")]
    best_matches: Option<Vec<SymbolSearchMatch>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SymbolSearchMatch {
    #[serde(rename = "1. symbol")]
    symbol: String,
    #[serde(rename = "2. name")]
    name: String,
    #[serde(rename = "3. type")]
    asset_type: String,
    #[serde(rename = "4. region")]
    region: String,
    #[serde(rename = "8. currency")]
    currency: Option<String>,
    #[serde(rename = "9. matchScore")]
    match_score: Option<String>,
}

impl AlphaVantageProvider {
    /// Create a new Alpha Vantage provider with the given API key.
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, api_key }
    }

    /// Make a request to the Alpha Vantage API.
    async fn fetch(&self, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        let url = reqwest::Url::parse_with_params(BASE_URL, &all_params).map_err(|e| {
            MarketDataError::Unavailable {
                reason: format!("{}: failed to build URL: {}", PROVIDER_ID, e),
            }
        })?;

        debug!(
            "Alpha Vantage request: {}",
            url.as_str().replace(&self.api_key, "***")
        );

        let response = self.client.get(url).send().await.map_err(|e| {
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
            let retry_after = retry_after_secs(response.headers());
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

    /// Check for API-level errors reported inside a 200 response.
    fn check_api_error(
        error_message: &Option<String>,
        note: &Option<String>,
        information: &Option<String>,
    ) -> Result<(), MarketDataError> {
        if let Some(msg) = error_message {
            if msg.contains("Invalid API call") || msg.contains("not found") {
                return Err(MarketDataError::SymbolNotFound(msg.clone()));
            }
            return Err(MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: msg.clone(),
            });
        }

        // "Note" and "Information" usually indicate throttling
        for msg in [note, information].into_iter().flatten() {
            if msg.contains("API call frequency") || msg.contains("rate limit") {
                return Err(MarketDataError::RateLimited {
                    provider: PROVIDER_ID.to_string(),
                    retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
                });
            }
            warn!("Alpha Vantage note: {}", msg);
        }

        Ok(())
    }

    /// Parse a YYYY-MM-DD trading day into a UTC timestamp.
    fn parse_trading_day(date_str: &str) -> Option<DateTime<Utc>> {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|dt| Utc.from_local_datetime(&dt).single())
    }

    /// Parse a decimal value, tolerating a trailing percent sign.
    fn parse_decimal(s: &str) -> Option<Decimal> {
        Decimal::from_str(s.trim().trim_end_matches('%')).ok()
    }
}

#[async_trait]
impl QuoteProvider for AlphaVantageProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        5
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            asset_classes: &[AssetClass::Equity],
            supports_search: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        // Free tier: 5 calls per minute
        RateLimit {
            requests_per_minute: 5,
        }
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let params = [("function", "GLOBAL_QUOTE"), ("symbol", symbol)];

        let text = self.fetch(&params).await?;
        let response: GlobalQuoteResponse =
            serde_json::from_str(&text).map_err(|e| MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: format!("failed to parse response: {}", e),
            })?;

        Self::check_api_error(
            &response.error_message,
            &response.note,
            &response.information,
        )?;

        // Unknown symbols come back as a present-but-empty "Global Quote"
        let global = response
            .global_quote
            .filter(|g| g.symbol.is_some() && g.price.is_some())
            .ok_or_else(|| MarketDataError::SymbolNotFound(symbol.to_string()))?;

        let price = global
            .price
            .as_deref()
            .and_then(Self::parse_decimal)
            .ok_or_else(|| MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: format!("unparseable price for {}", symbol),
            })?;

        let observed_at = global
            .latest_trading_day
            .as_deref()
            .and_then(Self::parse_trading_day)
            .unwrap_or_else(Utc::now);

        let mut quote = Quote::new(symbol, price, "USD", observed_at, PROVIDER_ID);
        quote.change_abs = global.change.as_deref().and_then(Self::parse_decimal);
        quote.change_pct = global
            .change_percent
            .as_deref()
            .and_then(Self::parse_decimal);
        quote.volume = global.volume.as_deref().and_then(Self::parse_decimal);

        Ok(quote)
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, MarketDataError> {
        let params = [("function", "SYMBOL_SEARCH"), ("keywords", query)];

        let text = self.fetch(&params).await?;
        let response: SymbolSearchResponse =
            serde_json::from_str(&text).map_err(|e| MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: format!("failed to parse search response: {}", e),
            })?;

        Self::check_api_error(
            &response.error_message,
            &response.note,
            &response.information,
        )?;

        let matches = response
            .best_matches
            .unwrap_or_default()
            .into_iter()
            .map(|m| {
                let mut result = SymbolMatch::new(m.symbol, m.name, m.region, m.asset_type);
                if let Some(currency) = m.currency {
                    result = result.with_currency(currency);
                }
                if let Some(score) = m.match_score.as_deref().and_then(|s| s.parse().ok()) {
                    result = result.with_score(score);
                }
                result
            })
            .collect();

        Ok(matches)
    }
}

/// Read a Retry-After header, falling back to the provider default.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_decimal_handles_percent_suffix() {
        assert_eq!(
            AlphaVantageProvider::parse_decimal("1.3961%"),
            Some(dec!(1.3961))
        );
        assert_eq!(
            AlphaVantageProvider::parse_decimal("189.95"),
            Some(dec!(189.95))
        );
        assert_eq!(AlphaVantageProvider::parse_decimal("None"), None);
    }

    #[test]
    fn test_parse_trading_day() {
        let ts = AlphaVantageProvider::parse_trading_day("2024-01-05").unwrap();
        assert_eq!(ts.format("%Y-%m-%d").to_string(), "2024-01-05");
        assert!(AlphaVantageProvider::parse_trading_day("not-a-date").is_none());
    }

    #[test]
    fn test_rate_limit_note_classified() {
        let note = Some(
            "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute"
                .to_string(),
        );
        let err = AlphaVantageProvider::check_api_error(&None, &note, &None).unwrap_err();
        assert!(matches!(err, MarketDataError::RateLimited { .. }));
    }

    #[test]
    fn test_invalid_api_call_classified_as_not_found() {
        let msg = Some("Invalid API call. Please retry or visit the documentation".to_string());
        let err = AlphaVantageProvider::check_api_error(&msg, &None, &None).unwrap_err();
        assert!(matches!(err, MarketDataError::SymbolNotFound(_)));
    }

    #[test]
    fn test_empty_global_quote_is_not_found() {
        let provider = AlphaVantageProvider::new("test_key".to_string());
        assert_eq!(provider.id(), "ALPHA_VANTAGE");

        let text = r#"{"Global Quote": {}}"#;
        let response: GlobalQuoteResponse = serde_json::from_str(text).unwrap();
        assert!(response
            .global_quote
            .filter(|g| g.symbol.is_some() && g.price.is_some())
            .is_none());
    }

    #[test]
    fn test_global_quote_parses() {
        let text = r#"{
            "Global Quote": {
                "01. symbol": "AAPL",
                "05. price": "189.9500",
                "06. volume": "48087681",
                "07. latest trading day": "2024-01-05",
                "09. change": "2.6200",
                "10. change percent": "1.3961%"
            }
        }"#;
        let response: GlobalQuoteResponse = serde_json::from_str(text).unwrap();
        let global = response.global_quote.unwrap();
        assert_eq!(global.symbol.as_deref(), Some("AAPL"));
        assert_eq!(
            AlphaVantageProvider::parse_decimal(global.price.as_deref().unwrap()),
            Some(dec!(189.95))
        );
    }
}
