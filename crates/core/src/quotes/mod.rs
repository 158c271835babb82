//! Cache-first quote lookups.
//!
//! [`QuoteService`] is the facade the API layer talks to: it checks
//! the cache before touching any provider, writes fetched quotes back,
//! and hosts the warm-up entry points the scheduler drives. The cache
//! is strictly an optimization here - when it is down every lookup
//! simply takes the provider path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::cache::{BulkEntry, BulkOutcome, CacheStore};
use crate::errors::Result;
use crate::watchlist::WatchlistSource;
use quotefolio_market_data::{MarketDataService, Quote, SymbolMatch};

/// Cache-first facade over [`MarketDataService`].
pub struct QuoteService {
    market: Arc<MarketDataService>,
    cache: Arc<CacheStore>,
    watchlist: Arc<dyn WatchlistSource>,
    quote_ttl: Duration,
    trending_ttl: Duration,
}

impl QuoteService {
    pub fn new(
        market: Arc<MarketDataService>,
        cache: Arc<CacheStore>,
        watchlist: Arc<dyn WatchlistSource>,
        quote_ttl: Duration,
        trending_ttl: Duration,
    ) -> Self {
        Self {
            market,
            cache,
            watchlist,
            quote_ttl,
            trending_ttl,
        }
    }

    /// Latest quote for a symbol, from cache when fresh.
    ///
    /// A caller pinning a provider reads and misses on the pinned key;
    /// everyone else shares the provider-agnostic entry. Fetched quotes
    /// are written back under both.
    pub async fn get_quote(
        &self,
        symbol: &str,
        preferred: Option<&str>,
        allow_fallback: bool,
    ) -> Result<Quote> {
        let read_key = match preferred {
            Some(provider) => CacheStore::quote_source_key(symbol, provider),
            None => CacheStore::quote_key(symbol),
        };

        if let Some(quote) = self.cache.get::<Quote>(&read_key).await {
            debug!("Cache hit for {}", read_key);
            return Ok(quote);
        }

        let quote = self.market.get_quote(symbol, preferred, allow_fallback).await?;

        self.cache
            .set(&CacheStore::quote_key(&quote.symbol), &quote, self.quote_ttl)
            .await;
        self.cache
            .set(
                &CacheStore::quote_source_key(&quote.symbol, &quote.source),
                &quote,
                self.quote_ttl,
            )
            .await;

        Ok(quote)
    }

    /// Quotes for several symbols; failed symbols map to `None`.
    ///
    /// Cached symbols are served without a provider call; only the
    /// misses go through the fallback chains, and their results are
    /// written back in one pipelined batch.
    pub async fn get_bulk_quotes(&self, symbols: &[String]) -> HashMap<String, Option<Quote>> {
        let mut quotes: HashMap<String, Option<Quote>> = HashMap::with_capacity(symbols.len());
        let mut misses: Vec<String> = Vec::new();

        for symbol in symbols {
            let key = CacheStore::quote_key(symbol);
            match self.cache.get::<Quote>(&key).await {
                Some(quote) => {
                    quotes.insert(quote.symbol.clone(), Some(quote));
                }
                None => misses.push(symbol.clone()),
            }
        }

        if misses.is_empty() {
            return quotes;
        }

        let fetched = self.market.get_bulk_quotes(&misses).await;
        self.write_back(&fetched, self.quote_ttl).await;
        quotes.extend(fetched);

        quotes
    }

    /// Quotes for the trending watch-list.
    pub async fn get_trending(&self) -> HashMap<String, Option<Quote>> {
        self.get_bulk_quotes(&self.watchlist.trending_symbols()).await
    }

    /// Symbol search, passed straight through (searches are not cached).
    pub async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>> {
        Ok(self.market.search_symbols(query).await?)
    }

    /// Drop cached entries for one symbol - every source, or one.
    pub async fn invalidate(&self, symbol: &str, source: Option<&str>) -> u64 {
        match source {
            Some(source) => {
                self.cache
                    .delete(&[CacheStore::quote_source_key(symbol, source)])
                    .await
            }
            None => {
                self.cache
                    .delete_by_pattern(&CacheStore::symbol_pattern(symbol))
                    .await
            }
        }
    }

    /// Drop every cached quote entry.
    pub async fn invalidate_all(&self) -> u64 {
        self.cache.delete_by_pattern(&CacheStore::all_pattern()).await
    }

    /// Proactively refresh the hot watch-list into the cache.
    ///
    /// Partial failures are logged, never raised - the scheduler keeps
    /// ticking regardless.
    pub async fn refresh_hot_symbols(&self) -> BulkOutcome {
        let symbols = self.watchlist.hot_symbols();
        info!("Refreshing {} hot symbols", symbols.len());

        let fetched = self.market.get_bulk_quotes(&symbols).await;
        let outcome = self.write_back(&fetched, self.quote_ttl).await;

        let missed = fetched.values().filter(|q| q.is_none()).count();
        if missed > 0 {
            warn!("Hot refresh could not resolve {} symbol(s)", missed);
        }
        outcome
    }

    /// Refresh the trending set with the longer TTL.
    pub async fn refresh_trending(&self) -> BulkOutcome {
        let symbols = self.watchlist.trending_symbols();
        info!("Refreshing {} trending symbols", symbols.len());

        let fetched = self.market.get_bulk_quotes(&symbols).await;
        self.write_back(&fetched, self.trending_ttl).await
    }

    /// Nightly maintenance: invalidate everything, then immediately
    /// re-warm hot and trending so the cache is never left cold.
    pub async fn purge_and_rewarm(&self) {
        let purged = self.invalidate_all().await;
        info!("Nightly purge removed {} cache entries", purged);

        self.refresh_hot_symbols().await;
        self.refresh_trending().await;
    }

    /// Bulk-cache fetched quotes under their provider-agnostic keys.
    async fn write_back(
        &self,
        fetched: &HashMap<String, Option<Quote>>,
        ttl: Duration,
    ) -> BulkOutcome {
        let entries: Vec<BulkEntry> = fetched
            .iter()
            .filter_map(|(symbol, quote)| {
                let quote = quote.as_ref()?;
                let payload = serde_json::to_value(quote).ok()?;
                Some(BulkEntry {
                    symbol: symbol.clone(),
                    source: None,
                    payload,
                })
            })
            .collect();

        if entries.is_empty() {
            return BulkOutcome::default();
        }

        self.cache.bulk_set(&entries, ttl).await
    }
}
