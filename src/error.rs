//! Error types for Podnotes.

use thiserror::Error;

/// Library-level error type for Podnotes operations.
#[derive(Error, Debug)]
pub enum NotesError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Episode source error: {0}")]
    Episode(String),

    #[error("No transcript available for '{episode_id}': {attempts}")]
    NoTranscript { episode_id: String, attempts: String },

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Extraction failed for template '{template}': {reason}")]
    Extraction { template: String, reason: String },

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Interview error: {0}")]
    Interview(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cost ledger error: {0}")]
    Ledger(String),

    #[error("Output write failed for '{file}': {reason}")]
    OutputWrite { file: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Podnotes operations.
pub type Result<T> = std::result::Result<T, NotesError>;
