//! In-memory cache implementation.
//!
//! Useful for testing and one-shot runs.

use super::{is_expired, CacheKey, ContentCache};
use crate::error::{NotesError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

struct Entry {
    value: String,
    created_at: i64,
    ttl_seconds: Option<i64>,
}

/// In-memory content cache.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| NotesError::Cache(format!("lock poisoned: {}", e)))?;

        let now = Utc::now().timestamp();
        Ok(entries.get(key.as_str()).and_then(|entry| {
            if is_expired(entry.created_at, entry.ttl_seconds, now) {
                None
            } else {
                Some(entry.value.clone())
            }
        }))
    }

    async fn put(&self, key: &CacheKey, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| NotesError::Cache(format!("lock poisoned: {}", e)))?;

        entries.insert(
            key.as_str().to_string(),
            Entry {
                value: value.to_string(),
                created_at: Utc::now().timestamp(),
                ttl_seconds: ttl.map(|d| d.as_secs() as i64),
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| NotesError::Cache(format!("lock poisoned: {}", e)))?;
        entries.remove(key.as_str());
        Ok(())
    }

    async fn clear_expired(&self) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| NotesError::Cache(format!("lock poisoned: {}", e)))?;

        let now = Utc::now().timestamp();
        let before = entries.len();
        entries.retain(|_, e| !is_expired(e.created_at, e.ttl_seconds, now));
        Ok(before - entries.len())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| NotesError::Cache(format!("lock poisoned: {}", e)))?;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }
}
