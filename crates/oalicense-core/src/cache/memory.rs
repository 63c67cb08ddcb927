//! In-process cache backend

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::error::CacheError;

use super::CacheBackend;

#[derive(Debug)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// Cache backend held in memory
///
/// Expired values are hidden on read and removed lazily, or in bulk by
/// [`CacheBackend::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, StoredValue>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(err: std::sync::PoisonError<T>) -> CacheError {
    CacheError::Backend(format!("lock poisoned: {}", err))
}

impl CacheBackend for InMemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().map_err(poisoned)?;
            match entries.get(key) {
                None => return Ok(None),
                Some(value) if value.expires_at > now => return Ok(Some(value.bytes.clone())),
                Some(_) => {}
            }
        }

        // Expired: evict unless a writer replaced it in the meantime
        let mut entries = self.entries.write().map_err(poisoned)?;
        if entries.get(key).is_some_and(|v| v.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    fn set_ex(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(u32::MAX as u64));
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(
            key.to_string(),
            StoredValue {
                bytes: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, value| value.expires_at > now);
        Ok(before - entries.len())
    }
}
