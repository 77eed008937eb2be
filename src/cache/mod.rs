//! Content-addressed cache with TTL semantics.
//!
//! Both transcription and extraction consult this cache before making paid
//! API calls. Keys are derived from every input that affects the cached
//! value, so identical inputs always hit the same entry and differing
//! inputs never collide.

mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use crate::error::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// A content-addressed cache key.
///
/// Built from the logical inputs of a cached operation; the same inputs
/// always produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key from an ordered list of input parts.
    ///
    /// Parts are length-prefixed before hashing so that ("ab", "c") and
    /// ("a", "bc") produce different keys.
    pub fn from_parts(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.len().to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Key for a cached transcript: (episode id, strategy tag).
    pub fn transcript(episode_id: &str, source_tag: &str) -> Self {
        Self::from_parts(&["transcript", episode_id, source_tag])
    }

    /// Key for a cached extraction result: (episode id, template name,
    /// transcript content hash, prompt version).
    pub fn extraction(
        episode_id: &str,
        template: &str,
        transcript_hash: &str,
        prompt_version: &str,
    ) -> Self {
        Self::from_parts(&[
            "extraction",
            episode_id,
            template,
            transcript_hash,
            prompt_version,
        ])
    }

    /// The key as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hash arbitrary content for use as a cache key part.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Trait for content cache implementations.
///
/// Expired entries read as misses; reads never mutate the store. Writes to
/// the same key are last-writer-wins.
#[async_trait]
pub trait ContentCache: Send + Sync {
    /// Get a value. Returns None on miss or expiry.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>>;

    /// Store a value. A `ttl` of None means the entry never expires.
    async fn put(&self, key: &CacheKey, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Remove a single entry.
    async fn invalidate(&self, key: &CacheKey) -> Result<()>;

    /// Remove all expired entries. Explicit maintenance, never implicit.
    async fn clear_expired(&self) -> Result<usize>;

    /// Remove all entries.
    async fn clear(&self) -> Result<usize>;
}

/// Whether an entry created at `created_at` (unix seconds) with the given
/// TTL is expired at `now`.
pub(crate) fn is_expired(created_at: i64, ttl_seconds: Option<i64>, now: i64) -> bool {
    match ttl_seconds {
        Some(ttl) => now - created_at >= ttl,
        None => false,
    }
}
