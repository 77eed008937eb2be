//! Cache command: prune expired entries or clear everything.

use crate::cache::{ContentCache, SqliteCache};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::Result;

/// Remove expired cache entries.
pub async fn run_cache_prune(settings: Settings) -> Result<()> {
    preflight::check(Operation::Maintenance)?;
    let cache = SqliteCache::new(&settings.cache_path())?;
    let removed = cache.clear_expired().await?;
    Output::success(&format!("Pruned {} expired cache entries.", removed));
    Ok(())
}

/// Remove all cache entries. Subsequent runs will re-fetch and re-extract,
/// incurring costs again.
pub async fn run_cache_clear(settings: Settings) -> Result<()> {
    preflight::check(Operation::Maintenance)?;
    let cache = SqliteCache::new(&settings.cache_path())?;
    let removed = cache.clear().await?;
    Output::success(&format!("Cleared {} cache entries.", removed));
    Output::warning("Future runs will re-run paid transcription and extraction.");
    Ok(())
}
