//! Podnotes CLI entry point.

use anyhow::Result;
use clap::Parser;
use podnotes::cli::{commands, CacheAction, Cli, Commands, CostsAction};
use podnotes::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("podnotes={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    // Ensure data directories exist
    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.notes_dir())?;

    // Execute command
    match cli.command {
        Commands::Process {
            episode,
            templates,
            interview,
            dry_run,
        } => {
            commands::run_process(&episode, templates, interview, dry_run, settings).await?;
        }

        Commands::Costs { action } => match action {
            CostsAction::Show { episode, kind } => {
                commands::run_costs_show(episode, kind, settings).await?;
            }
            CostsAction::Clear => {
                commands::run_costs_clear(settings).await?;
            }
        },

        Commands::Cache { action } => match action {
            CacheAction::Prune => {
                commands::run_cache_prune(settings).await?;
            }
            CacheAction::Clear => {
                commands::run_cache_clear(settings).await?;
            }
        },

        Commands::Templates => {
            commands::run_templates(settings)?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(&action, settings)?;
        }
    }

    Ok(())
}
