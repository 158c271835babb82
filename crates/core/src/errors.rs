//! Core error types for the Quotefolio backend.
//!
//! Cache failures deliberately never surface through the quote read
//! path - a broken cache degrades to always-miss. The variants here
//! exist for construction-time reporting and for the API layer's
//! status-code mapping.

use thiserror::Error;

use crate::cache::CacheError;
use quotefolio_market_data::MarketDataError;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the application core.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Market data operation failed: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Cache backend error: {0}")]
    Cache(#[from] CacheError),
}

impl Error {
    /// The market data error inside, when there is one.
    ///
    /// The API layer uses this for its 404/429/503 mapping.
    pub fn as_market_data(&self) -> Option<&MarketDataError> {
        match self {
            Self::MarketData(e) => Some(e),
            Self::Cache(_) => None,
        }
    }
}
