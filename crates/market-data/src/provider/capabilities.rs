//! Provider capabilities and rate limiting configuration.

use crate::models::AssetClass;

/// Describes what a market data provider can do.
///
/// The service uses this to scope fallback chains to one asset class
/// and to pick providers for symbol search.
#[derive(Clone, Debug)]
pub struct ProviderCapabilities {
    /// Asset classes this provider can quote. The first entry is the
    /// provider's primary class and decides which chain a request
    /// preferring this provider runs in.
    pub asset_classes: &'static [AssetClass],

    /// Whether the provider supports symbol/ticker search.
    pub supports_search: bool,
}

impl ProviderCapabilities {
    /// The provider's primary asset class.
    pub fn primary_class(&self) -> AssetClass {
        self.asset_classes[0]
    }

    /// Whether the provider serves the given class at all.
    pub fn serves(&self, class: AssetClass) -> bool {
        self.asset_classes.contains(&class)
    }
}

/// Outbound rate limit declared by a provider.
///
/// Wired into the shared sliding-window limiter at construction so the
/// orchestrator never burns upstream quota the adapter knows it
/// doesn't have.
#[derive(Clone, Copy, Debug)]
pub struct RateLimit {
    /// Maximum requests allowed per minute.
    pub requests_per_minute: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
        }
    }
}
