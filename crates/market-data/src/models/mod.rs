//! Data models for the market data crate.

mod quote;
mod search;
mod types;

pub use quote::Quote;
pub use search::SymbolMatch;
pub use types::AssetClass;
