//! CLI module for Podnotes.

pub mod commands;
mod output;
pub mod preflight;

pub use output::{format_elapsed, Output};

use clap::{Parser, Subcommand};

/// Podnotes - Podcast Episodes to Structured Notes
///
/// Turns podcast episodes into structured notes: transcripts, summaries,
/// quotes, and your own reflections, with every cent of spend tracked.
#[derive(Parser, Debug)]
#[command(name = "podnotes")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process an episode into structured notes
    Process {
        /// Path to the episode metadata JSON (from your feed tool)
        episode: String,

        /// Comma-separated template names, replacing the computed selection
        #[arg(short, long)]
        templates: Option<String>,

        /// Run a reflection interview after notes are written
        #[arg(short, long)]
        interview: bool,

        /// Show which templates would run without making any paid calls
        #[arg(long)]
        dry_run: bool,
    },

    /// Show or clear recorded API costs
    Costs {
        #[command(subcommand)]
        action: CostsAction,
    },

    /// Maintain the content cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// List available extraction templates
    Templates,

    /// Check configuration and system requirements
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CostsAction {
    /// Show recorded costs
    Show {
        /// Filter by episode ID
        #[arg(short, long)]
        episode: Option<String>,

        /// Filter by operation kind (transcription, extraction, interview)
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Clear all cost history
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove expired entries
    Prune,

    /// Remove all entries
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
