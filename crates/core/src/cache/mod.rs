//! TTL cache for market data payloads.

mod backend;
mod store;

pub use backend::{CacheBackend, CacheError, MemoryBackend, RedisBackend};
pub use store::{BulkEntry, BulkOutcome, CacheStore};
