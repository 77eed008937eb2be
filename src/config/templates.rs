//! Extraction template definitions.
//!
//! Templates can be customized by placing TOML files in the custom template
//! directory; a file named `<template>.toml` replaces the built-in of the
//! same name, and new names add templates.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Relative cost hint for a template, used by dry-run estimation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    /// Short prompt, short completion.
    Low,
    /// Typical single-pass extraction.
    #[default]
    Standard,
    /// Long completions or multiple fields.
    Premium,
}

impl std::fmt::Display for CostTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CostTier::Low => write!(f, "low"),
            CostTier::Standard => write!(f, "standard"),
            CostTier::Premium => write!(f, "premium"),
        }
    }
}

/// A named extraction task with its prompt and expected output schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionTemplate {
    /// Template name, used in cache keys and output file names.
    pub name: String,
    /// Category this template has an affinity for, if any.
    #[serde(default)]
    pub category: Option<String>,
    /// System prompt.
    pub system: String,
    /// User prompt with `{{placeholder}}` substitutions.
    pub user: String,
    /// Fields the response JSON object must contain.
    pub required_fields: Vec<String>,
    /// Provider this template pins, overriding the configured default.
    #[serde(default)]
    pub provider: Option<String>,
    /// Relative cost hint.
    #[serde(default)]
    pub cost_tier: CostTier,
}

impl ExtractionTemplate {
    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }
}

/// The set of templates known to this run: built-ins plus custom overrides.
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    templates: HashMap<String, ExtractionTemplate>,
}

impl TemplateLibrary {
    /// Load the built-in templates, applying overrides from the custom
    /// directory if one is configured.
    pub fn load(custom_dir: Option<&str>) -> Result<Self> {
        let mut templates: HashMap<String, ExtractionTemplate> = builtin_templates()
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());
            if custom_path.is_dir() {
                for entry in std::fs::read_dir(&custom_path)? {
                    let path = entry?.path();
                    if path.extension().is_some_and(|e| e == "toml") {
                        let content = std::fs::read_to_string(&path)?;
                        let template: ExtractionTemplate = toml::from_str(&content)?;
                        templates.insert(template.name.clone(), template);
                    }
                }
            }
        }

        Ok(Self { templates })
    }

    /// Look up a template by name.
    pub fn get(&self, name: &str) -> Option<&ExtractionTemplate> {
        self.templates.get(name)
    }

    /// All template names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the library is empty.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Built-in extraction templates.
fn builtin_templates() -> Vec<ExtractionTemplate> {
    vec![
        ExtractionTemplate {
            name: "summary".to_string(),
            category: None,
            system: r#"You are a podcast analyst. You write tight, factual summaries of episode transcripts.

Rules:
- Summarize only what was actually said; never invent content
- Skip ads, intros, and housekeeping
- Write for someone deciding whether to listen to the full episode"#
                .to_string(),
            user: r#"Summarize this podcast episode.

Episode: {{title}}
Description: {{description}}

Transcript:
{{transcript}}

Respond with a JSON object containing:
- "summary": 2-4 paragraph summary of the episode
- "topics": array of the main topics discussed (3-8 short strings)"#
                .to_string(),
            required_fields: vec!["summary".to_string(), "topics".to_string()],
            provider: None,
            cost_tier: CostTier::Standard,
        },
        ExtractionTemplate {
            name: "quotes".to_string(),
            category: None,
            system: r#"You are a podcast analyst. You pull out the most quotable moments from episode transcripts.

Rules:
- Quote verbatim from the transcript; light cleanup of filler words is allowed
- Prefer quotes that stand on their own without context
- Never fabricate a quote"#
                .to_string(),
            user: r#"Extract the best quotes from this podcast episode.

Episode: {{title}}

Transcript:
{{transcript}}

Respond with a JSON object containing:
- "quotes": array of objects, each with "text" (the quote) and "context" (one sentence on when it was said)"#
                .to_string(),
            required_fields: vec!["quotes".to_string()],
            provider: None,
            cost_tier: CostTier::Standard,
        },
        ExtractionTemplate {
            name: "key_points".to_string(),
            category: Some("tech".to_string()),
            system: r#"You are a technical podcast analyst. You distill episodes into concrete, actionable points for engineers.

Rules:
- Capture specific claims, numbers, tools, and techniques
- Skip opinions that carry no technical content
- Each point should make sense without hearing the episode"#
                .to_string(),
            user: r#"Extract the key technical points from this episode.

Episode: {{title}}

Transcript:
{{transcript}}

Respond with a JSON object containing:
- "points": array of key technical points (strings)
- "tools": array of tools, libraries, or products mentioned"#
                .to_string(),
            required_fields: vec!["points".to_string(), "tools".to_string()],
            provider: None,
            cost_tier: CostTier::Standard,
        },
        ExtractionTemplate {
            name: "guest_profile".to_string(),
            category: Some("interview".to_string()),
            system: r#"You are a podcast analyst. You build short profiles of interview guests from what they say on the show.

Rules:
- Only use facts stated in the transcript
- If no guest can be identified, say so in the "name" field"#
                .to_string(),
            user: r#"Profile the guest of this interview episode.

Episode: {{title}}

Transcript:
{{transcript}}

Respond with a JSON object containing:
- "name": the guest's name, or "unknown"
- "background": 1-2 sentences on who they are
- "positions": array of notable positions or claims they made"#
                .to_string(),
            required_fields: vec![
                "name".to_string(),
                "background".to_string(),
                "positions".to_string(),
            ],
            provider: None,
            cost_tier: CostTier::Standard,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_library() {
        let library = TemplateLibrary::load(None).unwrap();
        assert!(library.get("summary").is_some());
        assert!(library.get("quotes").is_some());
        assert!(library.get("key_points").is_some());
        assert!(library.get("nope").is_none());
    }

    #[test]
    fn test_render_template() {
        let template = "Episode: {{title}} ({{duration}} min)";
        let mut vars = HashMap::new();
        vars.insert("title".to_string(), "Test Episode".to_string());
        vars.insert("duration".to_string(), "42".to_string());

        let result = ExtractionTemplate::render(template, &vars);
        assert_eq!(result, "Episode: Test Episode (42 min)");
    }

    #[test]
    fn test_required_fields_present() {
        for template in builtin_templates() {
            assert!(
                !template.required_fields.is_empty(),
                "template {} has no required fields",
                template.name
            );
        }
    }
}
