//! Configuration settings for Podnotes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub transcription: TranscriptionSettings,
    pub extraction: ExtractionSettings,
    pub providers: HashMap<String, ProviderSettings>,
    pub interview: InterviewSettings,
    pub storage: StorageSettings,
    pub categories: CategorySettings,
}


/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Directory where per-episode note workspaces are created.
    pub notes_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.podnotes".to_string(),
            notes_dir: "~/.podnotes/notes".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Transcription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Try the free transcript lookup before paying for transcription.
    pub try_free_first: bool,
    /// Model for paid transcription.
    pub paid_model: String,
    /// Price per audio minute for paid transcription, in USD.
    pub paid_price_per_minute: f64,
    /// Language hint passed to the transcription service.
    pub language: Option<String>,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            try_free_first: true,
            paid_model: "whisper-1".to_string(),
            paid_price_per_minute: 0.006,
            language: None,
        }
    }
}

/// Extraction engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Templates applied to every episode unless overridden.
    pub default_templates: Vec<String>,
    /// Provider used when a template does not pin one.
    pub default_provider: String,
    /// Maximum concurrent template extractions.
    pub max_concurrent: usize,
    /// Version tag mixed into extraction cache keys; bump to invalidate
    /// cached results after editing prompts.
    pub prompt_version: String,
    /// Directory for custom template definitions (overrides built-ins).
    pub custom_template_dir: Option<String>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            default_templates: vec!["summary".to_string(), "quotes".to_string()],
            default_provider: "openai".to_string(),
            max_concurrent: 3,
            prompt_version: "v1".to_string(),
            custom_template_dir: None,
        }
    }
}

/// Per-provider LLM settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Model identifier sent to the API.
    pub model: String,
    /// Price per 1K prompt tokens, in USD.
    pub prompt_price_per_1k: f64,
    /// Price per 1K completion tokens, in USD.
    pub completion_price_per_1k: f64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            prompt_price_per_1k: 0.00015,
            completion_price_per_1k: 0.0006,
        }
    }
}

/// Interview session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewSettings {
    /// Maximum number of question/answer turns per session.
    pub max_turns: usize,
    /// How many of the most recent turns are included in the question
    /// prompt. Older turns are dropped from the context window.
    pub context_turns: usize,
    /// Provider used for question generation.
    pub provider: String,
    /// Maximum transcript characters included in the question prompt.
    pub max_transcript_chars: usize,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        Self {
            max_turns: 5,
            context_turns: 3,
            provider: "openai".to_string(),
            max_transcript_chars: 8000,
        }
    }
}

/// Storage locations for the cache and cost ledger.
///
/// Both live outside episode workspaces and are shared across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path to the content cache database.
    pub cache_path: String,
    /// Path to the cost ledger database.
    pub ledger_path: String,
    /// Transcript cache TTL in days. Absent means transcripts never expire.
    pub transcript_ttl_days: Option<u32>,
    /// Extraction cache TTL in days. Absent means results never expire.
    pub extraction_ttl_days: Option<u32>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            cache_path: "~/.podnotes/cache.db".to_string(),
            ledger_path: "~/.podnotes/costs.db".to_string(),
            transcript_ttl_days: None,
            extraction_ttl_days: None,
        }
    }
}

/// A category inference rule: the first rule whose keywords match the
/// episode title/description at least `min_keyword_matches` times wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Category name.
    pub name: String,
    /// Keywords matched (case-insensitively) against title + description.
    pub keywords: Vec<String>,
}

/// Category inference settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorySettings {
    /// Minimum distinct keyword matches for a rule to apply.
    pub min_keyword_matches: usize,
    /// Ordered rule table. Earlier rules win ties.
    pub rules: Vec<CategoryRule>,
    /// Extra templates unioned with the defaults when a category matches.
    pub template_sets: HashMap<String, Vec<String>>,
}

impl Default for CategorySettings {
    fn default() -> Self {
        let mut template_sets = HashMap::new();
        template_sets.insert("tech".to_string(), vec!["key_points".to_string()]);
        template_sets.insert("interview".to_string(), vec!["guest_profile".to_string()]);

        Self {
            min_keyword_matches: 1,
            rules: vec![
                CategoryRule {
                    name: "tech".to_string(),
                    keywords: vec![
                        "kubernetes".to_string(),
                        "rust".to_string(),
                        "database".to_string(),
                        "software".to_string(),
                        "programming".to_string(),
                        "engineering".to_string(),
                        "cloud".to_string(),
                    ],
                },
                CategoryRule {
                    name: "interview".to_string(),
                    keywords: vec![
                        "interview".to_string(),
                        "conversation with".to_string(),
                        "in conversation".to_string(),
                        "guest".to_string(),
                    ],
                },
            ],
            template_sets,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::NotesError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("podnotes")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded notes directory path.
    pub fn notes_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.notes_dir)
    }

    /// Get the expanded cache database path.
    pub fn cache_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.cache_path)
    }

    /// Get the expanded cost ledger database path.
    pub fn ledger_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.ledger_path)
    }

    /// Provider settings by name, falling back to defaults for "openai".
    pub fn provider(&self, name: &str) -> Option<ProviderSettings> {
        if let Some(p) = self.providers.get(name) {
            return Some(p.clone());
        }
        if name == "openai" {
            return Some(ProviderSettings::default());
        }
        None
    }
}
