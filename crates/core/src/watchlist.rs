//! Watch-list source for scheduled refresh.
//!
//! The persistence layer owns which symbols are "popular"; this trait
//! is the seam it plugs into. The static implementation carries the
//! curated defaults and is what tests and keyless deployments use.

/// Supplies the symbol sets the scheduler keeps warm.
pub trait WatchlistSource: Send + Sync {
    /// Symbols refreshed on the short interval with a short TTL.
    fn hot_symbols(&self) -> Vec<String>;

    /// Symbols served by the trending endpoint, refreshed hourly.
    fn trending_symbols(&self) -> Vec<String>;
}

/// Fixed, curated watch-list.
pub struct StaticWatchlist {
    hot: Vec<String>,
    trending: Vec<String>,
}

impl StaticWatchlist {
    pub fn new(hot: Vec<String>, trending: Vec<String>) -> Self {
        Self { hot, trending }
    }
}

impl Default for StaticWatchlist {
    fn default() -> Self {
        let hot = [
            "AAPL", "GOOGL", "MSFT", "AMZN", "TSLA", "META", "NVDA", "JPM", "V", "WMT",
        ];
        let trending = ["AAPL", "MSFT", "TSLA", "NVDA", "AMZN"];

        Self::new(
            hot.iter().map(|s| s.to_string()).collect(),
            trending.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl WatchlistSource for StaticWatchlist {
    fn hot_symbols(&self) -> Vec<String> {
        self.hot.clone()
    }

    fn trending_symbols(&self) -> Vec<String> {
        self.trending.clone()
    }
}
