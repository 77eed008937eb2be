//! Structured content extraction.
//!
//! Runs each selected template against the transcript, concurrently up to a
//! configured limit. A template failing validation or its provider call
//! never aborts its siblings; failures are collected into the report.

mod provider;
mod selector;

pub use provider::{Completion, LlmProvider, OpenAiProvider, ProviderRegistry};
pub use selector::{infer_category, select_templates};

use crate::cache::{CacheKey, ContentCache};
use crate::config::{ExtractionTemplate, TemplateLibrary};
use crate::episode::Episode;
use crate::error::{NotesError, Result};
use crate::ledger::{CostLedger, CostRecord, OperationKind};
use crate::transcript::Transcript;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A successful extraction for one (episode, template) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Episode the extraction ran for.
    pub episode_id: String,
    /// Template that produced it.
    pub template: String,
    /// Provider that served it.
    pub provider: String,
    /// Structured fields, keyed by the template's schema field names.
    pub fields: BTreeMap<String, Value>,
    /// Cost in USD. Zero when served from cache.
    pub cost: f64,
    /// When the extraction was created.
    pub created_at: DateTime<Utc>,
}

impl ExtractionResult {
    /// Render the structured fields as a markdown document.
    pub fn render_markdown(&self, episode_title: &str) -> String {
        let mut out = format!("# {} - {}\n", episode_title, self.template);
        for (field, value) in &self.fields {
            out.push_str(&format!("\n## {}\n\n", field));
            out.push_str(&render_value(value));
        }
        out
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{}\n", s),
        Value::Array(items) => {
            let mut out = String::new();
            for item in items {
                match item {
                    Value::String(s) => out.push_str(&format!("- {}\n", s)),
                    Value::Object(map) => {
                        let parts: Vec<String> = map
                            .iter()
                            .map(|(k, v)| match v {
                                Value::String(s) => format!("{}: {}", k, s),
                                other => format!("{}: {}", k, other),
                            })
                            .collect();
                        out.push_str(&format!("- {}\n", parts.join("; ")));
                    }
                    other => out.push_str(&format!("- {}\n", other)),
                }
            }
            out
        }
        other => format!("{}\n", other),
    }
}

/// One template's outcome, with cache provenance for cost accounting.
#[derive(Debug, Clone)]
pub struct ExtractedOutcome {
    pub result: ExtractionResult,
    pub from_cache: bool,
}

/// A template that failed after its retry.
#[derive(Debug, Clone)]
pub struct TemplateFailure {
    pub template: String,
    pub reason: String,
}

/// The combined outcome of an extraction run across templates.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Successful extractions, in the order templates were requested.
    pub outcomes: Vec<ExtractedOutcome>,
    /// Failed templates with their reasons.
    pub failures: Vec<TemplateFailure>,
}

impl ExtractionReport {
    /// Names of templates that succeeded.
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.result.template.as_str()).collect()
    }

    /// Total cost newly incurred by this run (cache hits excluded).
    pub fn new_cost(&self) -> f64 {
        self.outcomes
            .iter()
            .filter(|o| !o.from_cache)
            .map(|o| o.result.cost)
            .sum()
    }
}

/// Extraction engine: renders prompts, dispatches providers, validates
/// responses, and caches results.
pub struct ExtractionEngine {
    library: TemplateLibrary,
    providers: ProviderRegistry,
    cache: Arc<dyn ContentCache>,
    ledger: Arc<dyn CostLedger>,
    max_concurrent: usize,
    prompt_version: String,
    cache_ttl: Option<Duration>,
}

impl ExtractionEngine {
    pub fn new(
        library: TemplateLibrary,
        providers: ProviderRegistry,
        cache: Arc<dyn ContentCache>,
        ledger: Arc<dyn CostLedger>,
        max_concurrent: usize,
        prompt_version: &str,
        cache_ttl: Option<Duration>,
    ) -> Self {
        Self {
            library,
            providers,
            cache,
            ledger,
            max_concurrent: max_concurrent.max(1),
            prompt_version: prompt_version.to_string(),
            cache_ttl,
        }
    }

    /// The template library this engine runs against.
    pub fn library(&self) -> &TemplateLibrary {
        &self.library
    }

    /// Run all requested templates against the transcript.
    ///
    /// Templates execute concurrently up to the configured limit. Each
    /// worker returns its outcome to this single collector; no result state
    /// is shared between workers.
    #[instrument(skip(self, episode, transcript), fields(episode_id = %episode.episode_id))]
    pub async fn extract_all(
        &self,
        episode: &Episode,
        transcript: &Transcript,
        template_names: &[String],
    ) -> ExtractionReport {
        let mut report = ExtractionReport::default();

        let mut known: Vec<(usize, &ExtractionTemplate)> = Vec::new();
        for (idx, name) in template_names.iter().enumerate() {
            match self.library.get(name) {
                Some(template) => known.push((idx, template)),
                None => report.failures.push(TemplateFailure {
                    template: name.clone(),
                    reason: NotesError::UnknownTemplate(name.clone()).to_string(),
                }),
            }
        }

        info!(
            "Extracting {} templates (max {} concurrent)",
            known.len(),
            self.max_concurrent
        );

        let mut settled: Vec<(usize, String, Result<ExtractedOutcome>)> =
            stream::iter(known.into_iter())
                .map(|(idx, template)| async move {
                    let outcome = self.run_template(episode, transcript, template).await;
                    (idx, template.name.clone(), outcome)
                })
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;

        settled.sort_by_key(|(idx, _, _)| *idx);

        for (_, name, outcome) in settled {
            match outcome {
                Ok(extracted) => report.outcomes.push(extracted),
                Err(e) => {
                    warn!("Template '{}' failed: {}", name, e);
                    report.failures.push(TemplateFailure {
                        template: name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Run a single template: cache check, prompt render, provider call,
    /// validation with one stricter retry.
    async fn run_template(
        &self,
        episode: &Episode,
        transcript: &Transcript,
        template: &ExtractionTemplate,
    ) -> Result<ExtractedOutcome> {
        let key = CacheKey::extraction(
            &episode.episode_id,
            &template.name,
            &transcript.content_hash(),
            &self.prompt_version,
        );

        if let Some(cached) = self.cached_result(&key).await? {
            debug!("Cache hit for template '{}'", template.name);
            return Ok(ExtractedOutcome {
                result: ExtractionResult { cost: 0.0, ..cached },
                from_cache: true,
            });
        }

        let vars = prompt_vars(episode, transcript);
        let system = ExtractionTemplate::render(&template.system, &vars);
        let user = ExtractionTemplate::render(&template.user, &vars);

        let provider = self.providers.resolve(template.provider.as_deref())?;

        let mut total_cost = 0.0;
        let first = self
            .attempt(provider.as_ref(), episode, &system, &user, &mut total_cost)
            .await?;

        let fields = match parse_fields(&first, &template.required_fields) {
            Ok(fields) => fields,
            Err(reason) => {
                debug!(
                    "Template '{}' failed validation ({}), retrying once",
                    template.name, reason
                );
                let stricter = retry_prompt(&user, &reason, &template.required_fields);
                let second = self
                    .attempt(provider.as_ref(), episode, &system, &stricter, &mut total_cost)
                    .await?;
                parse_fields(&second, &template.required_fields).map_err(|reason| {
                    NotesError::Extraction {
                        template: template.name.clone(),
                        reason: format!("validation failed twice: {}", reason),
                    }
                })?
            }
        };

        let result = ExtractionResult {
            episode_id: episode.episode_id.clone(),
            template: template.name.clone(),
            provider: provider.name().to_string(),
            fields,
            cost: total_cost,
            created_at: Utc::now(),
        };

        self.store_result(&key, &result).await;

        Ok(ExtractedOutcome {
            result,
            from_cache: false,
        })
    }

    /// One provider call. The call's cost is recorded as soon as the
    /// provider returns, whether or not validation later succeeds.
    async fn attempt(
        &self,
        provider: &dyn LlmProvider,
        episode: &Episode,
        system: &str,
        user: &str,
        total_cost: &mut f64,
    ) -> Result<String> {
        let completion = provider.complete(system, user).await?;
        *total_cost += completion.cost;
        self.ledger
            .record(CostRecord::new(
                OperationKind::Extraction,
                provider.name(),
                completion.cost,
                &episode.episode_id,
            ))
            .await?;
        Ok(completion.text)
    }

    /// Look up a cached result; corrupt entries read as misses.
    async fn cached_result(&self, key: &CacheKey) -> Result<Option<ExtractionResult>> {
        match self.cache.get(key).await? {
            Some(raw) => match serde_json::from_str::<ExtractionResult>(&raw) {
                Ok(result) => Ok(Some(result)),
                Err(e) => {
                    warn!("Corrupt cached extraction, treating as miss: {}", e);
                    self.cache.invalidate(key).await.ok();
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn store_result(&self, key: &CacheKey, result: &ExtractionResult) {
        match serde_json::to_string(result) {
            Ok(raw) => {
                if let Err(e) = self.cache.put(key, &raw, self.cache_ttl).await {
                    warn!("Failed to cache extraction result: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize extraction result: {}", e),
        }
    }
}

/// Variables substituted into template prompts.
fn prompt_vars(episode: &Episode, transcript: &Transcript) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("title".to_string(), episode.title.clone());
    vars.insert("description".to_string(), episode.description.clone());
    vars.insert("transcript".to_string(), transcript.text.clone());
    vars.insert(
        "duration_minutes".to_string(),
        episode
            .duration_seconds
            .map(|d| (d / 60).to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    );
    vars
}

/// Parse a model response against the template's required fields.
///
/// The JSON object is extracted from the response even when wrapped in
/// prose or code fences.
fn parse_fields(response: &str, required: &[String]) -> std::result::Result<BTreeMap<String, Value>, String> {
    let json_start = response.find('{');
    let json_end = response.rfind('}');

    let json_str = match (json_start, json_end) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => return Err("no JSON object in response".to_string()),
    };

    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| format!("invalid JSON: {}", e))?;

    let Value::Object(map) = value else {
        return Err("response JSON is not an object".to_string());
    };

    let missing: Vec<&str> = required
        .iter()
        .filter(|f| !matches!(map.get(f.as_str()), Some(v) if !v.is_null()))
        .map(|f| f.as_str())
        .collect();

    if !missing.is_empty() {
        return Err(format!("missing required fields: {}", missing.join(", ")));
    }

    Ok(map.into_iter().collect())
}

/// Build the stricter re-prompt used after a validation failure.
fn retry_prompt(user: &str, reason: &str, required: &[String]) -> String {
    format!(
        "{}\n\nYour previous response could not be used: {}.\n\
         Respond with ONLY a valid JSON object containing exactly these fields: {}.\n\
         No prose, no code fences.",
        user,
        reason,
        required.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::ledger::{CostFilter, MemoryLedger};
    use crate::transcript::TranscriptSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn episode() -> Episode {
        Episode {
            feed_id: "feed".to_string(),
            episode_id: "ep1".to_string(),
            title: "Test Episode".to_string(),
            description: String::new(),
            published_at: None,
            audio_url: "https://example.com/a.mp3".to_string(),
            transcript_url: None,
            duration_seconds: Some(1800),
        }
    }

    fn transcript() -> Transcript {
        Transcript {
            episode_id: "ep1".to_string(),
            source: TranscriptSource::Free,
            text: "Hello world, this is a test transcript.".to_string(),
            language: Some("en".to_string()),
            cost: 0.0,
        }
    }

    /// Provider that plays back a scripted sequence of responses.
    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
        cost_per_call: f64,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<&str>, cost_per_call: f64) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
                calls: AtomicUsize::new(0),
                cost_per_call,
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _system: &str, user: &str) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                // Echo something template-dependent so tests can assert
                // which prompt drove which call.
                return Ok(Completion {
                    text: format!("{{\"echo\": {:?}}}", &user[..user.len().min(20)]),
                    cost: self.cost_per_call,
                });
            }
            Ok(Completion {
                text: responses.remove(0),
                cost: self.cost_per_call,
            })
        }
    }

    fn engine_with(provider: Arc<ScriptedProvider>, cache: Arc<MemoryCache>, ledger: Arc<MemoryLedger>) -> ExtractionEngine {
        let mut registry = ProviderRegistry::new("scripted");
        registry.register(provider);
        ExtractionEngine::new(
            TemplateLibrary::load(None).unwrap(),
            registry,
            cache,
            ledger,
            2,
            "v1",
            None,
        )
    }

    #[tokio::test]
    async fn test_successful_extraction() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![r#"{"summary": "A test.", "topics": ["testing"]}"#],
            0.01,
        ));
        let ledger = Arc::new(MemoryLedger::new());
        let engine = engine_with(provider, Arc::new(MemoryCache::new()), ledger.clone());

        let report = engine
            .extract_all(&episode(), &transcript(), &["summary".to_string()])
            .await;

        assert_eq!(report.outcomes.len(), 1);
        assert!(report.failures.is_empty());
        let result = &report.outcomes[0].result;
        assert_eq!(result.template, "summary");
        assert_eq!(result.fields["summary"], "A test.");
        assert!((result.cost - 0.01).abs() < 1e-9);

        let total = ledger.total(&CostFilter::default()).await.unwrap();
        assert!((total - 0.01).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_validation_retry_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![
                "no json here at all",
                r#"{"summary": "Second try.", "topics": []}"#,
            ],
            0.01,
        ));
        let ledger = Arc::new(MemoryLedger::new());
        let engine = engine_with(provider.clone(), Arc::new(MemoryCache::new()), ledger.clone());

        let report = engine
            .extract_all(&episode(), &transcript(), &["summary".to_string()])
            .await;

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        // Both attempts were priced and recorded.
        let total = ledger.total(&CostFilter::default()).await.unwrap();
        assert!((total - 0.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_double_validation_failure_is_isolated() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![
                // quotes template gets two bad responses; summary succeeds
                // (order of concurrent calls is not fixed, so make every
                // bad response invalid for quotes but the good one valid
                // for summary by required-field shape).
                r#"{"summary": "ok", "topics": ["a"], "quotes": null}"#,
                r#"{"summary": "ok", "topics": ["a"], "quotes": null}"#,
                r#"{"summary": "ok", "topics": ["a"], "quotes": null}"#,
            ],
            0.01,
        ));
        let mut registry = ProviderRegistry::new("scripted");
        registry.register(provider);
        let engine = ExtractionEngine::new(
            TemplateLibrary::load(None).unwrap(),
            registry,
            Arc::new(MemoryCache::new()),
            Arc::new(MemoryLedger::new()),
            1, // sequential, so the script order is deterministic
            "v1",
            None,
        );

        let report = engine
            .extract_all(
                &episode(),
                &transcript(),
                &["summary".to_string(), "quotes".to_string()],
            )
            .await;

        assert_eq!(report.succeeded(), vec!["summary"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].template, "quotes");
        assert!(report.failures[0].reason.contains("validation failed twice"));
    }

    #[tokio::test]
    async fn test_cache_hit_incurs_zero_cost() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![r#"{"summary": "Cached.", "topics": ["x"]}"#],
            0.05,
        ));
        let cache = Arc::new(MemoryCache::new());
        let ledger = Arc::new(MemoryLedger::new());
        let engine = engine_with(provider.clone(), cache.clone(), ledger.clone());

        let first = engine
            .extract_all(&episode(), &transcript(), &["summary".to_string()])
            .await;
        assert!(!first.outcomes[0].from_cache);

        let second = engine
            .extract_all(&episode(), &transcript(), &["summary".to_string()])
            .await;
        assert!(second.outcomes[0].from_cache);
        assert_eq!(second.outcomes[0].result.cost, 0.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // No second cost was recorded.
        let total = ledger.total(&CostFilter::default()).await.unwrap();
        assert!((total - 0.05).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_changed_transcript_misses_cache() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![
                r#"{"summary": "One.", "topics": ["a"]}"#,
                r#"{"summary": "Two.", "topics": ["b"]}"#,
            ],
            0.01,
        ));
        let cache = Arc::new(MemoryCache::new());
        let engine = engine_with(provider.clone(), cache, Arc::new(MemoryLedger::new()));

        engine
            .extract_all(&episode(), &transcript(), &["summary".to_string()])
            .await;

        let mut changed = transcript();
        changed.text.push_str(" And now for something different.");
        engine
            .extract_all(&episode(), &changed, &["summary".to_string()])
            .await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_template_reported() {
        let provider = Arc::new(ScriptedProvider::new(vec![], 0.0));
        let engine = engine_with(provider, Arc::new(MemoryCache::new()), Arc::new(MemoryLedger::new()));

        let report = engine
            .extract_all(&episode(), &transcript(), &["nonexistent".to_string()])
            .await;

        assert!(report.outcomes.is_empty());
        assert_eq!(report.failures[0].template, "nonexistent");
        assert!(report.failures[0].reason.contains("Unknown template"));
    }

    #[test]
    fn test_parse_fields_with_markdown_fences() {
        let response = "Here you go:\n```json\n{\"summary\": \"s\", \"topics\": []}\n```";
        let fields = parse_fields(
            response,
            &["summary".to_string(), "topics".to_string()],
        )
        .unwrap();
        assert_eq!(fields["summary"], "s");
    }

    #[test]
    fn test_parse_fields_missing_field() {
        let err = parse_fields(r#"{"summary": "s"}"#, &["summary".to_string(), "topics".to_string()])
            .unwrap_err();
        assert!(err.contains("topics"));
    }

    #[test]
    fn test_render_markdown() {
        let mut fields = BTreeMap::new();
        fields.insert("summary".to_string(), Value::String("Short.".to_string()));
        fields.insert(
            "topics".to_string(),
            serde_json::json!(["alpha", "beta"]),
        );
        let result = ExtractionResult {
            episode_id: "ep1".to_string(),
            template: "summary".to_string(),
            provider: "openai".to_string(),
            fields,
            cost: 0.0,
            created_at: Utc::now(),
        };

        let md = result.render_markdown("My Episode");
        assert!(md.starts_with("# My Episode - summary"));
        assert!(md.contains("- alpha"));
        assert!(md.contains("Short."));
    }
}
