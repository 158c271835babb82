//! Market data provider adapters.
//!
//! One module per upstream source. Each adapter translates its
//! upstream's response schema into the canonical [`crate::models::Quote`]
//! and classifies failures into the [`crate::errors::MarketDataError`]
//! taxonomy; none of them implement fallback.

pub mod alpha_vantage;
pub mod coingecko;
pub mod frankfurter;
pub mod metal_price;
pub mod yahoo;

mod capabilities;
mod traits;

pub use capabilities::{ProviderCapabilities, RateLimit};
pub use traits::QuoteProvider;
