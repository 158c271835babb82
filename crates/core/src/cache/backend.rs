//! Cache backend implementations.
//!
//! Two backends behind one trait, selected at construction: Redis for
//! deployments with a durable cache, and an in-memory map for tests
//! and for degraded startup when Redis is unreachable.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::warn;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

/// Errors from the cache backend. These never cross the store's public
/// read/write API - the store logs them and degrades to miss.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to connect to cache backend: {0}")]
    Connection(String),

    #[error("Cache command failed: {0}")]
    Command(String),
}

/// Storage abstraction under [`super::CacheStore`].
///
/// Values are opaque strings (the store handles serialization); TTLs
/// are mandatory on every write.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Delete the given keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// Delete every key matching a glob-style pattern, returning the
    /// number removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;

    /// Write several entries in one round trip, all with the same TTL.
    async fn set_many(&self, entries: &[(String, String)], ttl: Duration)
        -> Result<(), CacheError>;
}

// ============================================================================
// Redis backend
// ============================================================================

/// Redis-backed cache. Uses a `ConnectionManager`, which transparently
/// reconnects after transient failures.
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Connection(e.to_string()))?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.set_ex(key, value, ttl.as_secs())
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        conn.del(keys)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(pattern)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;
        if keys.is_empty() {
            return Ok(0);
        }
        conn.del(&keys)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }

    async fn set_many(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }

        // One pipelined round trip instead of N SETEX calls
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.set_ex(key, value, ttl.as_secs()).ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

struct StoredEntry {
    value: String,
    expires_at: Instant,
}

/// HashMap-backed cache with the same TTL semantics as Redis.
///
/// Expired entries are logically absent: reads check the expiry before
/// returning, regardless of whether the entry is still physically
/// present.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, StoredEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Memory cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.lock_entries();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.lock_entries();
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut entries = self.lock_entries();
        let mut removed = 0;
        for key in keys {
            if entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut entries = self.lock_entries();
        let before = entries.len() as u64;
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok(before - entries.len() as u64)
    }

    async fn set_many(
        &self,
        new_entries: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        let mut entries = self.lock_entries();
        for (key, value) in new_entries {
            entries.insert(
                key.clone(),
                StoredEntry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
        Ok(())
    }
}

/// Minimal glob matching: `*` matches any run of characters, everything
/// else is literal. Covers the key patterns Redis KEYS is used with
/// here (`marketdata:*`, `marketdata:AAPL*`).
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remaining = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match remaining.strip_prefix(part) {
                Some(rest) => remaining = rest,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return remaining.ends_with(part);
        } else {
            match remaining.find(part) {
                Some(pos) => remaining = &remaining[pos + part.len()..],
                None => return false,
            }
        }
    }

    true
}
