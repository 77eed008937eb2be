//! Free transcript lookup over HTTP.
//!
//! Fetches the transcript URL the feed published, when there is one. No
//! URL means the platform offers no transcript and the strategy declines.

use super::{FreeTranscript, FreeTranscriptProvider};
use crate::episode::Episode;
use crate::error::{NotesError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Fetches platform-provided transcripts from the feed's transcript URL.
pub struct HttpFreeProvider {
    client: reqwest::Client,
}

impl HttpFreeProvider {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for HttpFreeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FreeTranscriptProvider for HttpFreeProvider {
    async fn fetch_free(&self, episode: &Episode) -> Result<Option<FreeTranscript>> {
        let Some(url) = &episode.transcript_url else {
            debug!("Episode {} has no published transcript", episode.episode_id);
            return Ok(None);
        };

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(NotesError::Transcription(format!(
                "Transcript fetch returned {}",
                response.status()
            )));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            // A published-but-empty transcript declines rather than fails.
            return Ok(None);
        }

        Ok(Some(FreeTranscript {
            text,
            language: None,
        }))
    }
}
