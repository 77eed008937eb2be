//! OpenAI Whisper paid transcription implementation.

use super::{PaidTranscriber, PaidTranscription};
use crate::episode::Episode;
use crate::error::{NotesError, Result};
use crate::openai::create_client;
use async_openai::types::{AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// OpenAI Whisper-based paid transcriber.
///
/// Downloads the episode audio and sends it to the transcription API. Cost
/// is computed from the audio duration at the configured per-minute rate.
pub struct WhisperTranscriber {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    http: reqwest::Client,
    model: String,
    price_per_minute: f64,
    language: Option<String>,
}

impl WhisperTranscriber {
    /// Create a transcriber with default settings.
    pub fn new() -> Self {
        Self::with_config("whisper-1", 0.006, None)
    }

    /// Create a transcriber with custom configuration.
    pub fn with_config(model: &str, price_per_minute: f64, language: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client: create_client(),
            http,
            model: model.to_string(),
            price_per_minute,
            language,
        }
    }

    /// Download the episode audio into memory.
    async fn download_audio(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Downloading audio from {}", url);
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(NotesError::Transcription(format!(
                "Audio download returned {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// File name hint for the upload, taken from the URL path.
    fn file_name(url: &str) -> String {
        url.rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("audio.mp3")
            .split('?')
            .next()
            .unwrap_or("audio.mp3")
            .to_string()
    }
}

impl Default for WhisperTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaidTranscriber for WhisperTranscriber {
    fn provider_name(&self) -> &str {
        "whisper"
    }

    #[instrument(skip(self, episode), fields(episode_id = %episode.episode_id))]
    async fn transcribe_paid(&self, episode: &Episode) -> Result<PaidTranscription> {
        let audio_bytes = self.download_audio(&episode.audio_url).await?;
        info!("Downloaded {} bytes of audio", audio_bytes.len());

        let mut request_builder = CreateTranscriptionRequestArgs::default();
        request_builder
            .file(async_openai::types::AudioInput::from_vec_u8(
                Self::file_name(&episode.audio_url),
                audio_bytes,
            ))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson);

        if let Some(lang) = &self.language {
            request_builder.language(lang);
        }

        let request = request_builder
            .build()
            .map_err(|e| NotesError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| NotesError::OpenAI(format!("Whisper API error: {}", e)))?;

        let duration_minutes = response.duration as f64 / 60.0;
        let cost = duration_minutes * self.price_per_minute;

        debug!(
            "Transcribed {:.1} minutes of audio for ${:.4}",
            duration_minutes, cost
        );

        Ok(PaidTranscription {
            text: response.text.trim().to_string(),
            language: Some(response.language),
            cost,
        })
    }
}
