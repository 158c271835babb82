//! Error taxonomy for market data operations.
//!
//! Provider adapters classify every upstream failure into one of these
//! variants before it leaves the adapter; [`crate::service::MarketDataService`]
//! consumes them to drive the fallback chain and only surfaces an error
//! once the chain is exhausted.

use thiserror::Error;

/// Errors that can occur while fetching market data.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The upstream explicitly reported that the symbol does not exist.
    /// Terminal once the last provider in a chain has said so.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The symbol was rejected before any provider was called
    /// (empty, too long, or containing characters no upstream accepts).
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// The upstream signaled throttling (HTTP 429 or a documented
    /// rate-limit payload), or local outbound quota denied the call.
    #[error("Rate limited by {provider}, retry after {retry_after_secs}s")]
    RateLimited {
        /// Provider that throttled the request
        provider: String,
        /// Seconds the caller should wait before retrying
        retry_after_secs: u64,
    },

    /// Transport error, timeout, malformed response, or an exhausted
    /// fallback chain (in which case `reason` aggregates every
    /// provider's message).
    #[error("Market data unavailable: {reason}")]
    Unavailable {
        /// Human-readable failure description
        reason: String,
    },

    /// The upstream returned an explicit API-level error payload.
    /// The fallback chain treats this exactly like [`Self::Unavailable`].
    #[error("Provider error: {provider} - {message}")]
    ExternalApi {
        /// Provider that returned the error
        provider: String,
        /// Error message from the provider
        message: String,
    },
}

impl MarketDataError {
    /// Seconds to wait before retrying, when the upstream told us.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
