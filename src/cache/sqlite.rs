//! SQLite-backed cache implementation.
//!
//! The cache persists outside episode workspaces so transcripts and
//! extraction results survive across runs.

use super::{is_expired, CacheKey, ContentCache};
use crate::error::{NotesError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// SQLite-backed content cache.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (or create) a cache database at the given path.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        info!("Opened content cache at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory cache database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        // WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                ttl_seconds INTEGER
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| NotesError::Cache(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl ContentCache for SqliteCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        let conn = self.lock()?;

        let row: Option<(String, i64, Option<i64>)> = conn
            .query_row(
                "SELECT value, created_at, ttl_seconds FROM cache_entries WHERE key = ?1",
                params![key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let now = Utc::now().timestamp();
        Ok(row.and_then(|(value, created_at, ttl_seconds)| {
            if is_expired(created_at, ttl_seconds, now) {
                debug!("Cache entry {} expired, treating as miss", key);
                None
            } else {
                Some(value)
            }
        }))
    }

    async fn put(&self, key: &CacheKey, value: &str, ttl: Option<Duration>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries (key, value, created_at, ttl_seconds)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                key.as_str(),
                value,
                Utc::now().timestamp(),
                ttl.map(|d| d.as_secs() as i64),
            ],
        )?;
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM cache_entries WHERE key = ?1",
            params![key.as_str()],
        )?;
        Ok(())
    }

    async fn clear_expired(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE ttl_seconds IS NOT NULL AND ?1 - created_at >= ttl_seconds",
            params![Utc::now().timestamp()],
        )?;
        debug!("Pruned {} expired cache entries", removed);
        Ok(removed)
    }

    async fn clear(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM cache_entries", [])?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_cache_roundtrip() {
        let cache = SqliteCache::in_memory().unwrap();
        let key = CacheKey::from_parts(&["sqlite", "roundtrip"]);

        cache.put(&key, "stored", None).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some("stored".to_string()));

        cache.invalidate(&key).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_cache_ttl() {
        let cache = SqliteCache::in_memory().unwrap();
        let key = CacheKey::from_parts(&["sqlite", "ttl"]);

        cache
            .put(&key, "gone", Some(Duration::from_secs(0)))
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);

        // Expired entries survive reads; only clear_expired removes them.
        let removed = cache.clear_expired().await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_sqlite_cache_overwrite() {
        let cache = SqliteCache::in_memory().unwrap();
        let key = CacheKey::from_parts(&["sqlite", "overwrite"]);

        cache.put(&key, "first", None).await.unwrap();
        cache.put(&key, "second", None).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some("second".to_string()));
    }

    #[tokio::test]
    async fn test_sqlite_cache_clear() {
        let cache = SqliteCache::in_memory().unwrap();
        cache
            .put(&CacheKey::from_parts(&["a"]), "1", None)
            .await
            .unwrap();
        cache
            .put(&CacheKey::from_parts(&["b"]), "2", None)
            .await
            .unwrap();

        assert_eq!(cache.clear().await.unwrap(), 2);
    }
}
