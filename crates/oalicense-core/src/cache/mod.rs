//! License cache
//!
//! A key/value layer keyed by canonical identifier. Backends only move bytes
//! (`GET` / `SETEX` / `DEL`); [`CacheStore`] owns the JSON encoding, absorbs
//! backend faults and drops corrupt values. Staleness of a present entry is a
//! separate, content-based judgement made by [`is_stale`].

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
mod staleness;
mod store;

use std::time::Duration;

use crate::error::CacheError;

pub use memory::InMemoryBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
pub use staleness::{is_stale, is_stale_at, most_recent_date};
pub use store::{CacheLookup, CacheStore};

/// Byte-level cache backend
///
/// Implementations must make each single-key operation atomic: a reader sees
/// either the previous value or the new one, never a partial write.
pub trait CacheBackend: Send + Sync {
    /// Fetch the value stored under `key`, if present and not expired
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, replacing any previous value, expiring after `ttl`
    fn set_ex(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<(), CacheError>;

    /// Remove `key`; removing an absent key is not an error
    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Drop every expired value, returning how many were removed
    ///
    /// Backends that expire keys themselves keep the default.
    fn purge_expired(&self) -> Result<usize, CacheError> {
        Ok(0)
    }
}
