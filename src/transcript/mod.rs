//! Transcript acquisition with tiered strategy fallback.
//!
//! Strategies are tried strictly in order: the free platform transcript
//! first, paid transcription only if the free lookup declines or fails.
//! A declined strategy is not an error; exhausting every strategy is.

mod free;
mod whisper;

pub use free::HttpFreeProvider;
pub use whisper::WhisperTranscriber;

use crate::cache::{content_hash, CacheKey, ContentCache};
use crate::episode::Episode;
use crate::error::{NotesError, Result};
use crate::ledger::{CostLedger, CostRecord, OperationKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// The strategy that produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptSource {
    /// Platform-provided transcript, zero cost.
    Free,
    /// Paid transcription service.
    Paid,
}

impl std::fmt::Display for TranscriptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptSource::Free => write!(f, "free"),
            TranscriptSource::Paid => write!(f, "paid"),
        }
    }
}

/// A complete episode transcript.
///
/// Immutable after creation; cached under (episode id, source tag).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Episode this transcript belongs to.
    pub episode_id: String,
    /// Strategy that produced it.
    pub source: TranscriptSource,
    /// Full transcript text.
    pub text: String,
    /// Detected or declared language, if known.
    pub language: Option<String>,
    /// Acquisition cost in USD. Zero for free transcripts and cache hits.
    pub cost: f64,
}

impl Transcript {
    /// Content hash of the transcript text, used in extraction cache keys.
    pub fn content_hash(&self) -> String {
        content_hash(&self.text)
    }
}

/// A free transcript as returned by the platform lookup.
#[derive(Debug, Clone)]
pub struct FreeTranscript {
    pub text: String,
    pub language: Option<String>,
}

/// A paid transcription result with its cost.
#[derive(Debug, Clone)]
pub struct PaidTranscription {
    pub text: String,
    pub language: Option<String>,
    pub cost: f64,
}

/// Collaborator interface: free transcript lookup.
///
/// Returning `Ok(None)` means the platform has no transcript for this
/// episode; that declines the strategy without surfacing an error.
#[async_trait]
pub trait FreeTranscriptProvider: Send + Sync {
    async fn fetch_free(&self, episode: &Episode) -> Result<Option<FreeTranscript>>;
}

/// Collaborator interface: paid transcription service.
#[async_trait]
pub trait PaidTranscriber: Send + Sync {
    /// Provider name for cost records.
    fn provider_name(&self) -> &str;

    async fn transcribe_paid(&self, episode: &Episode) -> Result<PaidTranscription>;
}

/// A transcript plus where it came from this run.
#[derive(Debug, Clone)]
pub struct FetchedTranscript {
    pub transcript: Transcript,
    /// True when the transcript was served from cache; its acquisition cost
    /// was recorded when it was first created, not this run.
    pub from_cache: bool,
}

/// Chooses among transcript strategies in a fixed preference order.
pub struct TranscriptFetcher {
    free: Option<Arc<dyn FreeTranscriptProvider>>,
    paid: Option<Arc<dyn PaidTranscriber>>,
    cache: Arc<dyn ContentCache>,
    ledger: Arc<dyn CostLedger>,
    cache_ttl: Option<Duration>,
}

impl TranscriptFetcher {
    pub fn new(
        free: Option<Arc<dyn FreeTranscriptProvider>>,
        paid: Option<Arc<dyn PaidTranscriber>>,
        cache: Arc<dyn ContentCache>,
        ledger: Arc<dyn CostLedger>,
        cache_ttl: Option<Duration>,
    ) -> Self {
        Self {
            free,
            paid,
            cache,
            ledger,
            cache_ttl,
        }
    }

    /// Obtain a transcript for the episode, trying each strategy in order.
    ///
    /// The cache is consulted before any strategy invokes its service; a hit
    /// short-circuits the call entirely. Exhausting all strategies yields
    /// `NotesError::NoTranscript`, which is fatal for the episode.
    #[instrument(skip(self, episode), fields(episode_id = %episode.episode_id))]
    pub async fn fetch(&self, episode: &Episode) -> Result<FetchedTranscript> {
        let mut attempts: Vec<String> = Vec::new();

        if let Some(free) = &self.free {
            match self.try_cached(episode, TranscriptSource::Free).await? {
                Some(transcript) => {
                    info!("Using cached free transcript");
                    return Ok(FetchedTranscript {
                        transcript,
                        from_cache: true,
                    });
                }
                None => match free.fetch_free(episode).await {
                    Ok(Some(found)) => {
                        let transcript = Transcript {
                            episode_id: episode.episode_id.clone(),
                            source: TranscriptSource::Free,
                            text: found.text,
                            language: found.language,
                            cost: 0.0,
                        };
                        self.store(&transcript).await;
                        info!("Fetched free transcript ({} chars)", transcript.text.len());
                        return Ok(FetchedTranscript {
                            transcript,
                            from_cache: false,
                        });
                    }
                    Ok(None) => {
                        debug!("Free transcript unavailable, trying next strategy");
                        attempts.push("free: no transcript published".to_string());
                    }
                    Err(e) => {
                        warn!("Free transcript lookup failed: {}", e);
                        attempts.push(format!("free: {}", e));
                    }
                },
            }
        } else {
            attempts.push("free: strategy disabled".to_string());
        }

        if let Some(paid) = &self.paid {
            match self.try_cached(episode, TranscriptSource::Paid).await? {
                Some(transcript) => {
                    info!("Using cached paid transcript");
                    return Ok(FetchedTranscript {
                        transcript,
                        from_cache: true,
                    });
                }
                None => match paid.transcribe_paid(episode).await {
                    Ok(result) => {
                        self.ledger
                            .record(CostRecord::new(
                                OperationKind::Transcription,
                                paid.provider_name(),
                                result.cost,
                                &episode.episode_id,
                            ))
                            .await?;

                        let transcript = Transcript {
                            episode_id: episode.episode_id.clone(),
                            source: TranscriptSource::Paid,
                            text: result.text,
                            language: result.language,
                            cost: result.cost,
                        };
                        self.store(&transcript).await;
                        info!(
                            "Paid transcription complete ({} chars, ${:.4})",
                            transcript.text.len(),
                            transcript.cost
                        );
                        return Ok(FetchedTranscript {
                            transcript,
                            from_cache: false,
                        });
                    }
                    Err(e) => {
                        warn!("Paid transcription failed: {}", e);
                        attempts.push(format!("paid: {}", e));
                    }
                },
            }
        } else {
            attempts.push("paid: strategy disabled".to_string());
        }

        Err(NotesError::NoTranscript {
            episode_id: episode.episode_id.clone(),
            attempts: attempts.join("; "),
        })
    }

    /// Look up a cached transcript for a strategy. A value that fails to
    /// deserialize is dropped and treated as a miss.
    async fn try_cached(
        &self,
        episode: &Episode,
        source: TranscriptSource,
    ) -> Result<Option<Transcript>> {
        let key = CacheKey::transcript(&episode.episode_id, &source.to_string());
        match self.cache.get(&key).await? {
            Some(raw) => match serde_json::from_str::<Transcript>(&raw) {
                Ok(transcript) => Ok(Some(transcript)),
                Err(e) => {
                    warn!("Corrupt cached transcript, treating as miss: {}", e);
                    self.cache.invalidate(&key).await.ok();
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Write a fresh transcript to cache. Cache failures are logged, never
    /// surfaced; the transcript itself is already in hand.
    async fn store(&self, transcript: &Transcript) {
        let key = CacheKey::transcript(&transcript.episode_id, &transcript.source.to_string());
        match serde_json::to_string(transcript) {
            Ok(raw) => {
                if let Err(e) = self.cache.put(&key, &raw, self.cache_ttl).await {
                    warn!("Failed to cache transcript: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize transcript for cache: {}", e),
        }
    }
}
