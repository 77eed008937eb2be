//! Episode metadata and the feed collaborator interface.
//!
//! Feed fetching and RSS parsing live outside this crate; the pipeline only
//! consumes the metadata a feed source produces.

use crate::error::{NotesError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Metadata for a single podcast episode.
///
/// Immutable once fetched. The pipeline references episodes but never
/// mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Feed this episode belongs to.
    pub feed_id: String,
    /// Episode ID, unique within the feed.
    pub episode_id: String,
    /// Episode title.
    pub title: String,
    /// Episode description or show notes.
    #[serde(default)]
    pub description: String,
    /// Publish date.
    pub published_at: Option<DateTime<Utc>>,
    /// URL of the episode audio.
    pub audio_url: String,
    /// URL of a platform-provided transcript, if the feed offers one.
    #[serde(default)]
    pub transcript_url: Option<String>,
    /// Duration in seconds, if the feed reports it.
    pub duration_seconds: Option<u32>,
}

impl Episode {
    /// Load episode metadata from a JSON file produced by a feed source.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let episode: Episode = serde_json::from_str(&content)?;
        if episode.episode_id.is_empty() {
            return Err(NotesError::InvalidInput(
                "Episode metadata is missing an episode_id".to_string(),
            ));
        }
        Ok(episode)
    }

    /// Workspace directory name for this episode: `<feed>-<date>-<slug>`.
    pub fn workspace_dir_name(&self) -> String {
        let date = self
            .published_at
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string());
        format!("{}-{}-{}", slugify(&self.feed_id), date, slugify(&self.title))
    }
}

/// Trait for episode sources (RSS feeds, podcast directories).
#[async_trait]
pub trait EpisodeSource: Send + Sync {
    /// Fetch metadata for a single episode.
    async fn get_episode(&self, episode_id: &str) -> Result<Episode>;
}

/// Turn arbitrary text into a filesystem-safe slug.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let non_alnum = Regex::new(r"[^a-z0-9]+").expect("valid regex");
    let slug = non_alnum.replace_all(&lowered, "-");
    slug.trim_matches('-').to_string()
}
