//! Quotefolio application core.
//!
//! The application-side half of the market data resilience layer:
//!
//! - [`cache`] - TTL cache over a Redis or in-memory backend; degrades
//!   to always-miss when the backend is down
//! - [`limits`] - sliding-window rate limiter for inbound clients and
//!   outbound provider quota
//! - [`quotes`] - the cache-first facade the API layer calls
//! - [`scheduler`] - background jobs that keep the cache warm
//! - [`watchlist`] - the seam to the persistence layer's symbol lists
//! - [`context`] - explicit construction of the whole service graph
//!
//! Provider adapters and the fallback orchestrator live in the sibling
//! `quotefolio-market-data` crate.

pub mod cache;
pub mod context;
pub mod errors;
pub mod limits;
pub mod quotes;
pub mod scheduler;
pub mod settings;
pub mod watchlist;

pub use cache::{BulkEntry, BulkOutcome, CacheStore};
pub use context::AppContext;
pub use errors::{Error, Result};
pub use limits::{RateDecision, RateLimiter, RatePolicy};
pub use quotes::QuoteService;
pub use scheduler::RefreshScheduler;
pub use settings::Settings;
pub use watchlist::{StaticWatchlist, WatchlistSource};
