//! Template selection.
//!
//! A pure function of (episode metadata, config, override): no network, no
//! cache, cheap enough for repeated dry-run calls before any paid work.

use crate::config::{CategorySettings, ExtractionSettings};
use crate::episode::Episode;
use tracing::debug;

/// Infer the episode's category from keyword matches against the
/// configured rule table.
///
/// The first rule (in table order) with at least `min_keyword_matches`
/// distinct keyword hits wins.
pub fn infer_category<'a>(
    episode: &Episode,
    categories: &'a CategorySettings,
) -> Option<&'a str> {
    let haystack = format!("{} {}", episode.title, episode.description).to_lowercase();

    for rule in &categories.rules {
        let matches = rule
            .keywords
            .iter()
            .filter(|kw| haystack.contains(&kw.to_lowercase()))
            .count();
        if matches >= categories.min_keyword_matches {
            debug!(
                "Episode '{}' matched category '{}' ({} keywords)",
                episode.episode_id, rule.name, matches
            );
            return Some(&rule.name);
        }
    }
    None
}

/// Select the templates to run for an episode.
///
/// Starts from the configured defaults; a matching category unions its
/// template set in. An explicit override replaces the computed set
/// entirely. The result is ordered and de-duplicated.
pub fn select_templates(
    episode: &Episode,
    extraction: &ExtractionSettings,
    categories: &CategorySettings,
    override_templates: Option<&[String]>,
) -> Vec<String> {
    if let Some(explicit) = override_templates {
        return dedupe(explicit.iter().cloned());
    }

    let mut selected: Vec<String> = extraction.default_templates.clone();

    if let Some(category) = infer_category(episode, categories) {
        if let Some(extra) = categories.template_sets.get(category) {
            selected.extend(extra.iter().cloned());
        }
    }

    dedupe(selected.into_iter())
}

/// De-duplicate while preserving first-seen order.
fn dedupe(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names.filter(|n| seen.insert(n.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryRule;

    fn episode(title: &str, description: &str) -> Episode {
        Episode {
            feed_id: "feed".to_string(),
            episode_id: "ep1".to_string(),
            title: title.to_string(),
            description: description.to_string(),
            published_at: None,
            audio_url: "https://example.com/a.mp3".to_string(),
            transcript_url: None,
            duration_seconds: None,
        }
    }

    #[test]
    fn test_category_inference_from_title() {
        let categories = CategorySettings::default();
        let ep = episode("Deep Dive: Kubernetes Autoscaling", "");
        assert_eq!(infer_category(&ep, &categories), Some("tech"));
    }

    #[test]
    fn test_no_category_match() {
        let categories = CategorySettings::default();
        let ep = episode("Gardening for Beginners", "tomatoes and soil");
        assert_eq!(infer_category(&ep, &categories), None);
    }

    #[test]
    fn test_table_order_breaks_ties() {
        let categories = CategorySettings {
            min_keyword_matches: 1,
            rules: vec![
                CategoryRule {
                    name: "first".to_string(),
                    keywords: vec!["shared".to_string()],
                },
                CategoryRule {
                    name: "second".to_string(),
                    keywords: vec!["shared".to_string()],
                },
            ],
            template_sets: Default::default(),
        };

        let ep = episode("A shared keyword", "");
        assert_eq!(infer_category(&ep, &categories), Some("first"));
    }

    #[test]
    fn test_threshold_must_be_met() {
        let categories = CategorySettings {
            min_keyword_matches: 2,
            rules: vec![CategoryRule {
                name: "tech".to_string(),
                keywords: vec!["rust".to_string(), "cloud".to_string()],
            }],
            template_sets: Default::default(),
        };

        assert_eq!(infer_category(&episode("Rust only", ""), &categories), None);
        assert_eq!(
            infer_category(&episode("Rust in the cloud", ""), &categories),
            Some("tech")
        );
    }

    #[test]
    fn test_defaults_union_category_set() {
        let extraction = ExtractionSettings::default();
        let categories = CategorySettings::default();
        let ep = episode("Deep Dive: Kubernetes Autoscaling", "");

        let selected = select_templates(&ep, &extraction, &categories, None);
        assert_eq!(selected, vec!["summary", "quotes", "key_points"]);
    }

    #[test]
    fn test_no_match_yields_defaults_only() {
        let extraction = ExtractionSettings::default();
        let categories = CategorySettings::default();
        let ep = episode("Gardening for Beginners", "");

        let selected = select_templates(&ep, &extraction, &categories, None);
        assert_eq!(selected, vec!["summary", "quotes"]);
    }

    #[test]
    fn test_override_replaces_computed_set() {
        let extraction = ExtractionSettings::default();
        let categories = CategorySettings::default();
        let ep = episode("Deep Dive: Kubernetes Autoscaling", "");

        let override_list = vec!["quotes".to_string(), "quotes".to_string()];
        let selected = select_templates(&ep, &extraction, &categories, Some(&override_list));
        assert_eq!(selected, vec!["quotes"]);
    }

    #[test]
    fn test_dedupes_category_overlap_with_defaults() {
        let extraction = ExtractionSettings::default();
        let mut categories = CategorySettings::default();
        categories
            .template_sets
            .insert("tech".to_string(), vec!["summary".to_string(), "key_points".to_string()]);

        let ep = episode("Kubernetes again", "");
        let selected = select_templates(&ep, &extraction, &categories, None);
        assert_eq!(selected, vec!["summary", "quotes", "key_points"]);
    }
}
