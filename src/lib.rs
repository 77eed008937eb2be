//! Podnotes - Podcast Episodes to Structured Notes
//!
//! A CLI tool that turns podcast episodes into structured, searchable notes.
//!
//! # Overview
//!
//! Podnotes lets you:
//! - Obtain episode transcripts, free when the platform publishes one and
//!   paid transcription as a fallback
//! - Extract structured notes (summaries, quotes, key points) with
//!   configurable templates
//! - Capture your own reflections through a short guided interview
//! - Track every cent of API spend in a local ledger
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration and extraction template management
//! - `episode` - Episode metadata and the feed source interface
//! - `transcript` - Transcript acquisition with tiered strategy fallback
//! - `extract` - Template selection and structured extraction
//! - `interview` - Guided reflection sessions
//! - `cache` - Content-addressed cache shared by transcription and extraction
//! - `ledger` - Append-only cost ledger
//! - `output` - Atomic workspace persistence
//! - `pipeline` - Per-episode orchestration
//!
//! # Example
//!
//! ```rust,no_run
//! use podnotes::config::Settings;
//! use podnotes::episode::Episode;
//! use podnotes::extract::select_templates;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let episode = Episode::from_json_file(std::path::Path::new("episode.json"))?;
//!
//!     // Dry-run: which templates would process this episode?
//!     let templates = select_templates(
//!         &episode,
//!         &settings.extraction,
//!         &settings.categories,
//!         None,
//!     );
//!     println!("Would run: {}", templates.join(", "));
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod episode;
pub mod error;
pub mod extract;
pub mod interview;
pub mod ledger;
pub mod openai;
pub mod output;
pub mod pipeline;
pub mod transcript;

pub use error::{NotesError, Result};
