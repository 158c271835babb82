//! Quotefolio Market Data Crate
//!
//! Provider-agnostic market data fetching for the Quotefolio backend.
//!
//! # Overview
//!
//! This crate turns a set of unreliable, rate-limited upstream price
//! feeds into one typed lookup contract:
//!
//! - Multiple asset classes: equities, crypto, FX, commodities
//! - One adapter per upstream source, each classifying its own failures
//! - Fallback orchestration with a fixed per-class provider order
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +----------------------+
//! |    API layer     | --> |  MarketDataService   |  (fallback chain)
//! +------------------+     +----------------------+
//!                                    |
//!                                    v
//!                          +------------------+
//!                          |  QuoteProvider   |  (one per upstream)
//!                          +------------------+
//!                                    |
//!                                    v
//!                          +------------------+
//!                          |      Quote       |  (canonical shape)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Quote`] - canonical price observation
//! - [`SymbolMatch`] - symbol search result
//! - [`AssetClass`] - classification used to scope fallback chains
//! - [`MarketDataService`] - the orchestrator the API layer talks to
//! - [`MarketDataError`] - the error taxonomy every failure maps into

pub mod errors;
pub mod models;
pub mod provider;
pub mod service;

pub use errors::MarketDataError;
pub use models::{AssetClass, Quote, SymbolMatch};

pub use provider::alpha_vantage::AlphaVantageProvider;
pub use provider::coingecko::CoinGeckoProvider;
pub use provider::frankfurter::FrankfurterProvider;
pub use provider::metal_price::MetalPriceProvider;
pub use provider::yahoo::YahooProvider;
pub use provider::{ProviderCapabilities, QuoteProvider, RateLimit};

pub use service::{MarketDataService, ProviderQuota, QuotaDecision};
