//! Yahoo Finance market data provider.
//!
//! Primary equities alternate, and the broadest adapter in the set: it
//! also resolves crypto pairs (BTC-USD) and futures-style commodity
//! symbols (GC=F), which makes it the fallback of last resort for
//! those chains.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, warn};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use urlencoding::encode;
use yahoo_finance_api as yahoo;

use crate::errors::MarketDataError;
use crate::models::{AssetClass, Quote, SymbolMatch};
use crate::provider::{ProviderCapabilities, QuoteProvider, RateLimit};

const PROVIDER_ID: &str = "YAHOO";

/// Yahoo Finance provider, backed by the `yahoo_finance_api` crate.
pub struct YahooProvider {
    connector: yahoo::YahooConnector,
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider.
    pub fn new() -> Result<Self, MarketDataError> {
        let connector = yahoo::YahooConnector::new().map_err(|e| MarketDataError::Unavailable {
            reason: format!("{}: failed to initialize connector: {}", PROVIDER_ID, e),
        })?;
        Ok(Self { connector })
    }

    /// Convert a Yahoo chart quote into the canonical shape.
    fn to_quote(symbol: &str, yahoo_quote: &yahoo::Quote) -> Result<Quote, MarketDataError> {
        let observed_at: DateTime<Utc> = Utc
            .timestamp_opt(yahoo_quote.timestamp as i64, 0)
            .single()
            .unwrap_or_else(Utc::now);

        let price = Decimal::from_f64(yahoo_quote.close).ok_or_else(|| {
            MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: format!("unusable close price {} for {}", yahoo_quote.close, symbol),
            }
        })?;

        let mut quote = Quote::new(symbol, price, "USD", observed_at, PROVIDER_ID);
        quote.change_abs = Decimal::from_f64(yahoo_quote.close - yahoo_quote.open);
        if yahoo_quote.open != 0.0 {
            quote.change_pct = Decimal::from_f64(
                (yahoo_quote.close - yahoo_quote.open) / yahoo_quote.open * 100.0,
            );
        }
        quote.volume = Some(Decimal::from(yahoo_quote.volume));

        Ok(quote)
    }

    fn map_error(symbol: &str, e: yahoo::YahooError) -> MarketDataError {
        match e {
            yahoo::YahooError::NoQuotes | yahoo::YahooError::NoResult => {
                MarketDataError::SymbolNotFound(symbol.to_string())
            }
            yahoo::YahooError::ConnectionFailed(inner) => {
                if inner.is_timeout() {
                    MarketDataError::Unavailable {
                        reason: format!("{}: request timed out", PROVIDER_ID),
                    }
                } else {
                    MarketDataError::Unavailable {
                        reason: format!("{}: {}", PROVIDER_ID, inner),
                    }
                }
            }
            yahoo::YahooError::FetchFailed(msg) if msg.contains("429") => {
                MarketDataError::RateLimited {
                    provider: PROVIDER_ID.to_string(),
                    retry_after_secs: 60,
                }
            }
            other => MarketDataError::ExternalApi {
                provider: PROVIDER_ID.to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        10
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            asset_classes: &[AssetClass::Equity, AssetClass::Crypto, AssetClass::Commodity],
            supports_search: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
        }
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        debug!("Fetching latest quote for '{}' from Yahoo", symbol);

        let response = self
            .connector
            .get_latest_quotes(symbol, "1d")
            .await
            .map_err(|e| Self::map_error(symbol, e))?;

        let yahoo_quote = response.last_quote().map_err(|e| {
            warn!("No quotes returned for {}: {}", symbol, e);
            MarketDataError::SymbolNotFound(symbol.to_string())
        })?;

        Self::to_quote(symbol, &yahoo_quote)
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, MarketDataError> {
        let encoded_query = encode(query);

        debug!("Searching Yahoo for '{}'", query);

        let result = self
            .connector
            .search_ticker(&encoded_query)
            .await
            .map_err(|e| Self::map_error(query, e))?;

        let matches = result
            .quotes
            .iter()
            .map(|item| {
                SymbolMatch::new(
                    &item.symbol,
                    &item.long_name,
                    &item.exchange,
                    &item.quote_type,
                )
                .with_score(item.score)
            })
            .collect();

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart_quote(open: f64, close: f64, volume: u64, timestamp: i64) -> yahoo::Quote {
        yahoo::Quote {
            timestamp,
            open,
            high: close.max(open),
            low: close.min(open),
            volume,
            close,
            adjclose: close,
        }
    }

    #[test]
    fn test_to_quote_maps_fields() {
        let quote = YahooProvider::to_quote("AAPL", &chart_quote(180.0, 182.7, 1000, 1704470400))
            .unwrap();
        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.source, "YAHOO");
        assert!(quote.price > Decimal::ZERO);
        assert!(quote.change_abs.is_some());
        assert!(quote.change_pct.is_some());
    }

    #[test]
    fn test_to_quote_zero_open_has_no_change_pct() {
        let quote = YahooProvider::to_quote("GC=F", &chart_quote(0.0, 2050.0, 0, 1704470400))
            .unwrap();
        assert!(quote.change_pct.is_none());
    }

    #[test]
    fn test_map_error_classifies_not_found() {
        let err = YahooProvider::map_error("ZZZZINVALID", yahoo::YahooError::NoQuotes);
        assert!(matches!(err, MarketDataError::SymbolNotFound(_)));
    }

    #[test]
    fn test_map_error_classifies_rate_limit() {
        let err = YahooProvider::map_error(
            "AAPL",
            yahoo::YahooError::FetchFailed("status 429 Too Many Requests".to_string()),
        );
        assert!(matches!(err, MarketDataError::RateLimited { .. }));
    }
}
