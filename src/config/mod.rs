//! Configuration management for Podnotes.

mod settings;
mod templates;

pub use settings::{
    CategoryRule, CategorySettings, ExtractionSettings, GeneralSettings, InterviewSettings,
    ProviderSettings, Settings, StorageSettings, TranscriptionSettings,
};
pub use templates::{CostTier, ExtractionTemplate, TemplateLibrary};
