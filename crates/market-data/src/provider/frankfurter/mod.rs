//! Frankfurter foreign exchange provider.
//!
//! Daily reference rates (ECB publication schedule). Symbols are
//! six-letter currency pairs: "EURUSD" quotes 1 EUR in USD. The API
//! needs no key and reports the publication date, which becomes the
//! quote's observation time.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use log::debug;
use num_traits::FromPrimitive;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{AssetClass, Quote};
use crate::provider::{ProviderCapabilities, QuoteProvider, RateLimit};

const BASE_URL: &str = "https://api.frankfurter.app";
const PROVIDER_ID: &str = "FRANKFURTER";

/// Frankfurter FX rates provider.
pub struct FrankfurterProvider {
    client: Client,
}

/// /latest response, e.g.
/// `{"amount":1.0,"base":"EUR","date":"2024-01-05","rates":{"USD":1.0921}}`
#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    base: String,
    date: Option<String>,
    rates: HashMap<String, f64>,
}

impl FrankfurterProvider {
    /// Create a new Frankfurter provider.
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    /// Split a pair symbol into (base, quote) currency codes.
    ///
    /// Anything that is not six ASCII letters is reported as not found -
    /// the upstream only knows currency pairs.
    fn split_pair(symbol: &str) -> Result<(&str, &str), MarketDataError> {
        if symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok((&symbol[..3], &symbol[3..]))
        } else {
            Err(MarketDataError::SymbolNotFound(format!(
                "{} is not a currency pair",
                symbol
            )))
        }
    }

    fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|dt| Utc.from_local_datetime(&dt).single())
    }
}

impl Default for FrankfurterProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteProvider for FrankfurterProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        5
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            asset_classes: &[AssetClass::Fx],
            supports_search: false,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
        }
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let (base, target) = Self::split_pair(symbol)?;

        let url = format!("{}/latest?base={}&symbols={}", BASE_URL, base, target);
        debug!("Frankfurter request: {}", url);

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
        // Unknown base currencies come back as 404
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MarketDataError::SymbolNotFound(symbol.to_string()));
        }
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

        let rates: LatestRatesResponse =
            response
                .json()
                .await
                .map_err(|e| MarketDataError::ExternalApi {
                    provider: PROVIDER_ID.to_string(),
                    message: format!("failed to parse response: {}", e),
                })?;

        let rate = rates
            .rates
            .get(target)
            .copied()
            .and_then(Decimal::from_f64)
            .ok_or_else(|| MarketDataError::SymbolNotFound(symbol.to_string()))?;

        let observed_at = rates
            .date
            .as_deref()
            .and_then(Self::parse_date)
            .unwrap_or_else(Utc::now);

        debug!(
            "Frankfurter rate {}/{} = {} ({})",
            rates.base, target, rate, symbol
        );

        Ok(Quote::new(symbol, rate, target, observed_at, PROVIDER_ID))
    }
}
