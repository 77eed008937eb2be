//! Doctor command: check configuration and requirements.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::Result;
use crate::openai::is_api_key_configured;

/// Run diagnostic checks.
pub fn run_doctor(settings: &Settings) -> Result<()> {
    Output::header("Podnotes diagnostics");

    if is_api_key_configured() {
        Output::success("OPENAI_API_KEY is set");
    } else {
        Output::error("OPENAI_API_KEY is not set (required for transcription and extraction)");
    }

    let config_path = Settings::default_config_path();
    if config_path.exists() {
        Output::success(&format!("Config file: {}", config_path.display()));
    } else {
        Output::info(&format!(
            "No config file at {} (defaults in use)",
            config_path.display()
        ));
    }

    for (label, path) in [
        ("Data directory", settings.data_dir()),
        ("Notes directory", settings.notes_dir()),
    ] {
        if path.exists() {
            Output::success(&format!("{}: {}", label, path.display()));
        } else {
            Output::info(&format!("{}: {} (will be created)", label, path.display()));
        }
    }

    Output::kv("Cache", &settings.cache_path().display().to_string());
    Output::kv("Cost ledger", &settings.ledger_path().display().to_string());

    Ok(())
}
