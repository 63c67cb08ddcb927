//! Typed cache access over a byte backend

use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheError;
use crate::record::CacheEntry;

use super::CacheBackend;

/// Result of reading one key
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Found(CacheEntry),
    Absent,
    /// Bytes were present but did not decode as a cache entry
    Corrupt,
}

/// JSON cache store keyed by canonical identifier
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl CacheStore {
    /// Create a store writing entries with the given expiry
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read and decode `key` without side effects
    ///
    /// Backend failures read as [`CacheLookup::Absent`].
    pub fn read(&self, key: &str) -> CacheLookup {
        let bytes = match self.backend.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return CacheLookup::Absent,
            Err(e) => {
                tracing::warn!("cache read for {} failed: {}", key, e);
                return CacheLookup::Absent;
            }
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => CacheLookup::Found(entry),
            Err(e) => {
                tracing::debug!("cache value for {} does not decode: {}", key, e);
                CacheLookup::Corrupt
            }
        }
    }

    /// Fetch the entry for `key`
    ///
    /// A corrupt value is invalidated and reported as absent.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        match self.read(key) {
            CacheLookup::Found(entry) => Some(entry),
            CacheLookup::Absent => None,
            CacheLookup::Corrupt => {
                tracing::warn!("cache entry for {} is corrupt, invalidating", key);
                self.invalidate(key);
                None
            }
        }
    }

    /// Store `entry` under `key` with the configured expiry
    pub fn put(&self, key: &str, entry: &CacheEntry) {
        self.put_with_ttl(key, entry, self.ttl);
    }

    /// Store `entry` under `key`, overwriting any existing value
    pub fn put_with_ttl(&self, key: &str, entry: &CacheEntry, ttl: Duration) {
        if let Err(e) = self.try_put(key, entry, ttl) {
            tracing::warn!("cache write for {} failed: {}", key, e);
        }
    }

    fn try_put(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(entry)?;
        self.backend.set_ex(key, ttl, &bytes)?;
        tracing::debug!("cached {} for {:?}", key, ttl);
        Ok(())
    }

    /// Remove whatever is stored under `key`
    pub fn invalidate(&self, key: &str) {
        if let Err(e) = self.backend.delete(key) {
            tracing::warn!("cache invalidation for {} failed: {}", key, e);
        }
    }

    /// Evict expired entries from the backend
    ///
    /// Returns the number removed; a backend fault is logged and counts as zero.
    pub fn purge_expired(&self) -> usize {
        match self.backend.purge_expired() {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("cache purge failed: {}", e);
                0
            }
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").field("ttl", &self.ttl).finish()
    }
}
