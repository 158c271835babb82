//! Typed TTL cache over a [`CacheBackend`].
//!
//! The store is an optimization, never a dependency: every backend
//! failure is logged and degrades to a miss (reads) or a failed count
//! (writes). Callers cannot observe cache errors.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::backend::{CacheBackend, CacheError, MemoryBackend, RedisBackend};

/// Key prefix for quote entries.
const KEY_PREFIX: &str = "marketdata";

/// One unit of a bulk cache refresh.
#[derive(Clone, Debug)]
pub struct BulkEntry {
    /// Symbol the payload belongs to (becomes part of the key).
    pub symbol: String,
    /// Provider id for provider-pinned entries; `None` for the
    /// provider-agnostic key.
    pub source: Option<String>,
    /// The value to cache.
    pub payload: serde_json::Value,
}

/// Per-item outcome of a bulk write.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BulkOutcome {
    pub success: usize,
    pub failed: usize,
}

/// TTL key/value store for quotes and other market data payloads.
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
}

impl CacheStore {
    /// Connect to a Redis backend. Fails fast when the backend is
    /// unreachable so the caller can decide to degrade.
    pub async fn redis(url: &str) -> Result<Self, CacheError> {
        let backend = RedisBackend::connect(url).await?;
        Ok(Self {
            backend: Arc::new(backend),
        })
    }

    /// In-memory store with the same TTL semantics as Redis.
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
        }
    }

    /// Provider-agnostic cache key: `marketdata:{SYMBOL}`.
    pub fn quote_key(symbol: &str) -> String {
        format!("{}:{}", KEY_PREFIX, symbol.trim().to_uppercase())
    }

    /// Provider-pinned cache key: `marketdata:{SYMBOL}:{source}`.
    pub fn quote_source_key(symbol: &str, source: &str) -> String {
        format!("{}:{}:{}", KEY_PREFIX, symbol.trim().to_uppercase(), source)
    }

    /// Pattern matching every entry for one symbol, any source.
    pub fn symbol_pattern(symbol: &str) -> String {
        format!("{}:{}*", KEY_PREFIX, symbol.trim().to_uppercase())
    }

    /// Pattern matching every quote entry.
    pub fn all_pattern() -> String {
        format!("{}:*", KEY_PREFIX)
    }

    /// Read a typed value. Misses, expired entries, undecodable
    /// payloads and backend failures all come back as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                debug!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Write a typed value with a TTL. Returns whether the write stuck.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize cache entry {}: {}", key, e);
                return false;
            }
        };

        match self.backend.set(key, &raw, ttl).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Cache write failed for {}: {}", key, e);
                false
            }
        }
    }

    /// Delete the given keys, returning how many existed.
    pub async fn delete(&self, keys: &[String]) -> u64 {
        match self.backend.delete(keys).await {
            Ok(count) => count,
            Err(e) => {
                debug!("Cache delete failed: {}", e);
                0
            }
        }
    }

    /// Delete every key matching a glob-style pattern.
    pub async fn delete_by_pattern(&self, pattern: &str) -> u64 {
        match self.backend.delete_pattern(pattern).await {
            Ok(count) => {
                if count > 0 {
                    debug!("Invalidated {} cache entries for {}", count, pattern);
                }
                count
            }
            Err(e) => {
                debug!("Cache pattern delete failed for {}: {}", pattern, e);
                0
            }
        }
    }

    /// Write a batch of entries in one pipelined round trip.
    ///
    /// Malformed entries (empty symbol, null payload) fail individually
    /// without affecting the rest; a backend failure fails the whole
    /// batch.
    pub async fn bulk_set(&self, entries: &[BulkEntry], ttl: Duration) -> BulkOutcome {
        let mut prepared: Vec<(String, String)> = Vec::with_capacity(entries.len());
        let mut failed = 0;

        for entry in entries {
            let symbol = entry.symbol.trim();
            if symbol.is_empty() || entry.payload.is_null() {
                warn!(
                    "Skipping malformed bulk cache entry (symbol: '{}')",
                    entry.symbol
                );
                failed += 1;
                continue;
            }

            let key = match &entry.source {
                Some(source) => Self::quote_source_key(symbol, source),
                None => Self::quote_key(symbol),
            };
            prepared.push((key, entry.payload.to_string()));
        }

        if prepared.is_empty() {
            return BulkOutcome { success: 0, failed };
        }

        match self.backend.set_many(&prepared, ttl).await {
            Ok(()) => {
                debug!("Bulk cached {} entries (TTL {}s)", prepared.len(), ttl.as_secs());
                BulkOutcome {
                    success: prepared.len(),
                    failed,
                }
            }
            Err(e) => {
                warn!("Bulk cache write failed: {}", e);
                BulkOutcome {
                    success: 0,
                    failed: entries.len(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quotefolio_market_data::Quote;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn quote(symbol: &str) -> Quote {
        Quote::new(symbol, dec!(182.50), "USD", Utc::now(), "YAHOO")
    }

    #[test]
    fn test_key_scheme_normalizes_symbol() {
        assert_eq!(CacheStore::quote_key(" aapl "), "marketdata:AAPL");
        assert_eq!(
            CacheStore::quote_source_key("aapl", "YAHOO"),
            "marketdata:AAPL:YAHOO"
        );
        assert_eq!(CacheStore::symbol_pattern("aapl"), "marketdata:AAPL*");
        assert_eq!(CacheStore::all_pattern(), "marketdata:*");
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = CacheStore::in_memory();
        let key = CacheStore::quote_key("AAPL");

        assert!(store.set(&key, &quote("AAPL"), Duration::from_secs(300)).await);

        let cached: Quote = store.get(&key).await.unwrap();
        assert_eq!(cached.symbol, "AAPL");
        assert_eq!(cached.price, dec!(182.50));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = CacheStore::in_memory();
        let key = CacheStore::quote_key("AAPL");

        store.set(&key, &quote("AAPL"), Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.get::<Quote>(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let store = CacheStore::in_memory();
        let key = CacheStore::quote_key("AAPL");

        store.set(&key, &"not a quote", Duration::from_secs(60)).await;
        assert!(store.get::<Quote>(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_bulk_set_reports_malformed_entries() {
        let store = CacheStore::in_memory();

        let entries = vec![
            BulkEntry {
                symbol: "AAPL".to_string(),
                source: None,
                payload: serde_json::to_value(quote("AAPL")).unwrap(),
            },
            BulkEntry {
                symbol: "".to_string(),
                source: None,
                payload: json!({"price": 1}),
            },
            BulkEntry {
                symbol: "MSFT".to_string(),
                source: None,
                payload: serde_json::to_value(quote("MSFT")).unwrap(),
            },
        ];

        let outcome = store.bulk_set(&entries, Duration::from_secs(300)).await;
        assert_eq!(outcome, BulkOutcome { success: 2, failed: 1 });

        // The valid items are independently retrievable
        assert!(store
            .get::<Quote>(&CacheStore::quote_key("AAPL"))
            .await
            .is_some());
        assert!(store
            .get::<Quote>(&CacheStore::quote_key("MSFT"))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_null_payload_is_malformed() {
        let store = CacheStore::in_memory();
        let entries = vec![BulkEntry {
            symbol: "AAPL".to_string(),
            source: None,
            payload: serde_json::Value::Null,
        }];

        let outcome = store.bulk_set(&entries, Duration::from_secs(300)).await;
        assert_eq!(outcome, BulkOutcome { success: 0, failed: 1 });
    }

    #[tokio::test]
    async fn test_invalidate_by_symbol_pattern() {
        let store = CacheStore::in_memory();
        let ttl = Duration::from_secs(300);

        store.set(&CacheStore::quote_key("AAPL"), &quote("AAPL"), ttl).await;
        store
            .set(
                &CacheStore::quote_source_key("AAPL", "YAHOO"),
                &quote("AAPL"),
                ttl,
            )
            .await;
        store.set(&CacheStore::quote_key("MSFT"), &quote("MSFT"), ttl).await;

        let removed = store
            .delete_by_pattern(&CacheStore::symbol_pattern("AAPL"))
            .await;
        assert_eq!(removed, 2);
        assert!(store
            .get::<Quote>(&CacheStore::quote_key("MSFT"))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_delete_returns_existing_count() {
        let store = CacheStore::in_memory();
        let ttl = Duration::from_secs(300);
        store.set(&CacheStore::quote_key("AAPL"), &quote("AAPL"), ttl).await;

        let removed = store
            .delete(&[
                CacheStore::quote_key("AAPL"),
                CacheStore::quote_key("MISSING"),
            ])
            .await;
        assert_eq!(removed, 1);
    }
}
