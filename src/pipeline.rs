//! Pipeline orchestrator.
//!
//! Sequences transcript acquisition, template selection, extraction,
//! output writing, and the optional interview for one episode. Fatal
//! conditions (no transcript) stop the run before any extraction cost;
//! template and file failures are collected into the run summary instead
//! of aborting.

use crate::config::Settings;
use crate::episode::Episode;
use crate::error::Result;
use crate::extract::{select_templates, ExtractionEngine, TemplateFailure};
use crate::interview::{AnswerSource, InterviewRunner, InterviewState, InterviewStore};
use crate::ledger::{CostFilter, CostLedger};
use crate::output::{FileWriteError, OutputFile, OutputWriter};
use crate::transcript::{TranscriptFetcher, TranscriptSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transcript,
    Selection,
    Extraction,
    Write,
    Interview,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Transcript => write!(f, "transcript"),
            Stage::Selection => write!(f, "selection"),
            Stage::Extraction => write!(f, "extraction"),
            Stage::Write => write!(f, "write"),
            Stage::Interview => write!(f, "interview"),
        }
    }
}

/// Stage progress status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Started,
    Completed,
    Failed,
    Skipped,
}

/// Collaborator interface: progress events for the UI layer.
///
/// Fire-and-forget; the pipeline never consumes a return value.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, stage: Stage, status: StageStatus, detail: &str);
}

/// Progress sink that discards everything.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn emit(&self, _stage: Stage, _status: StageStatus, _detail: &str) {}
}

/// Per-template status persisted in workspace metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TemplateStatus {
    Succeeded {
        provider: String,
        cost: f64,
        cached: bool,
    },
    Failed {
        reason: String,
    },
}

/// Interview summary persisted in workspace metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSummary {
    pub state: InterviewState,
    pub turns: usize,
}

/// The `episode.json` metadata file written into each workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    pub feed_id: String,
    pub episode_id: String,
    pub title: String,
    pub processed_at: DateTime<Utc>,
    pub transcript_source: TranscriptSource,
    pub templates: BTreeMap<String, TemplateStatus>,
    pub interview: Option<InterviewSummary>,
    /// Total recorded spend for this episode across all runs.
    pub total_cost: f64,
}

/// Options for a single pipeline run.
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Explicit template list; replaces the computed selection entirely.
    pub template_override: Option<Vec<String>>,
    /// Run the interview after output is written.
    pub run_interview: bool,
}

/// Final summary of a pipeline run.
#[derive(Debug)]
pub struct RunSummary {
    pub episode_id: String,
    pub workspace: PathBuf,
    pub transcript_source: TranscriptSource,
    pub transcript_from_cache: bool,
    pub templates_succeeded: Vec<String>,
    pub templates_failed: Vec<TemplateFailure>,
    pub files_written: Vec<String>,
    pub files_failed: Vec<FileWriteError>,
    pub interview: Option<InterviewSummary>,
    pub interview_error: Option<String>,
    /// Cost newly incurred by this run.
    pub run_cost: f64,
    /// Total recorded spend for this episode across all runs.
    pub episode_total_cost: f64,
    pub elapsed: Duration,
    /// Transcript obtained, at least one template extracted, and its
    /// output written.
    pub success: bool,
}

/// The episode processing pipeline.
pub struct Pipeline {
    settings: Settings,
    fetcher: TranscriptFetcher,
    engine: ExtractionEngine,
    interviewer: Option<InterviewRunner>,
    ledger: Arc<dyn CostLedger>,
    progress: Arc<dyn ProgressSink>,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        fetcher: TranscriptFetcher,
        engine: ExtractionEngine,
        interviewer: Option<InterviewRunner>,
        ledger: Arc<dyn CostLedger>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            engine,
            interviewer,
            ledger,
            progress,
        }
    }

    /// Process one episode into its workspace directory.
    #[instrument(skip_all, fields(episode_id = %episode.episode_id))]
    pub async fn run(
        &self,
        episode: &Episode,
        workspace: &Path,
        mut answers: Option<&mut dyn AnswerSource>,
        options: &RunOptions,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let episode_filter = CostFilter {
            episode_id: Some(episode.episode_id.clone()),
            ..Default::default()
        };
        let cost_before = self.ledger.total(&episode_filter).await?;

        // Transcript: the only fatal stage.
        self.progress.emit(Stage::Transcript, StageStatus::Started, "");
        let fetched = match self.fetcher.fetch(episode).await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.progress
                    .emit(Stage::Transcript, StageStatus::Failed, &e.to_string());
                return Err(e);
            }
        };
        self.progress.emit(
            Stage::Transcript,
            StageStatus::Completed,
            &format!(
                "{} ({})",
                fetched.transcript.source,
                if fetched.from_cache { "cached" } else { "fresh" }
            ),
        );

        // Template selection is pure; no paid work yet.
        self.progress.emit(Stage::Selection, StageStatus::Started, "");
        let selected = select_templates(
            episode,
            &self.settings.extraction,
            &self.settings.categories,
            options.template_override.as_deref(),
        );
        self.progress
            .emit(Stage::Selection, StageStatus::Completed, &selected.join(", "));
        info!("Selected templates: {:?}", selected);

        // Extraction: per-template isolation inside the engine.
        self.progress.emit(Stage::Extraction, StageStatus::Started, "");
        let report = self
            .engine
            .extract_all(episode, &fetched.transcript, &selected)
            .await;
        let extraction_detail = format!(
            "{} succeeded, {} failed",
            report.outcomes.len(),
            report.failures.len()
        );
        let extraction_status = if report.outcomes.is_empty() && !report.failures.is_empty() {
            StageStatus::Failed
        } else {
            StageStatus::Completed
        };
        self.progress
            .emit(Stage::Extraction, extraction_status, &extraction_detail);

        // Write whatever succeeded, plus metadata reporting what did not.
        self.progress.emit(Stage::Write, StageStatus::Started, "");

        let mut template_status: BTreeMap<String, TemplateStatus> = BTreeMap::new();
        let mut files: Vec<OutputFile> = Vec::new();
        for outcome in &report.outcomes {
            template_status.insert(
                outcome.result.template.clone(),
                TemplateStatus::Succeeded {
                    provider: outcome.result.provider.clone(),
                    cost: outcome.result.cost,
                    cached: outcome.from_cache,
                },
            );
            files.push(OutputFile::new(
                &format!("{}.md", outcome.result.template),
                outcome.result.render_markdown(&episode.title),
            ));
        }
        for failure in &report.failures {
            template_status.insert(
                failure.template.clone(),
                TemplateStatus::Failed {
                    reason: failure.reason.clone(),
                },
            );
        }

        let mut metadata = WorkspaceMetadata {
            feed_id: episode.feed_id.clone(),
            episode_id: episode.episode_id.clone(),
            title: episode.title.clone(),
            processed_at: Utc::now(),
            transcript_source: fetched.transcript.source,
            templates: template_status,
            interview: None,
            total_cost: self.ledger.total(&episode_filter).await?,
        };
        files.push(metadata_file(&metadata)?);

        let write_report = OutputWriter::write_batch(workspace, &files)?;
        let write_status = if write_report.all_succeeded() {
            StageStatus::Completed
        } else {
            StageStatus::Failed
        };
        self.progress.emit(
            Stage::Write,
            write_status,
            &format!("{} files", write_report.written.len()),
        );

        // Interview: optional, non-fatal. Completed turns are durable
        // inside the runner regardless of how the session ends.
        let mut interview_summary = None;
        let mut interview_error = None;
        let mut files_written = write_report.written.clone();
        let mut files_failed = write_report.failed;

        match (&self.interviewer, options.run_interview, answers.as_deref_mut()) {
            (Some(runner), true, Some(answers)) => {
                self.progress.emit(Stage::Interview, StageStatus::Started, "");
                let store = InterviewStore::new(workspace);
                let extractions: Vec<_> =
                    report.outcomes.iter().map(|o| o.result.clone()).collect();
                match runner
                    .run(episode, &fetched.transcript, &extractions, answers, &store)
                    .await
                {
                    Ok(session) => {
                        let summary = InterviewSummary {
                            state: session.state,
                            turns: session.turns.len(),
                        };
                        self.progress.emit(
                            Stage::Interview,
                            StageStatus::Completed,
                            &format!("{} after {} turns", summary.state, summary.turns),
                        );
                        interview_summary = Some(summary);
                        files_written.push("interview.md".to_string());
                    }
                    Err(e) => {
                        warn!("Interview failed: {}", e);
                        self.progress
                            .emit(Stage::Interview, StageStatus::Failed, &e.to_string());
                        interview_error = Some(e.to_string());
                    }
                }

                // Final metadata update with the interview outcome.
                metadata.interview = interview_summary.clone();
                metadata.total_cost = self.ledger.total(&episode_filter).await?;
                let update = OutputWriter::write_batch(workspace, &[metadata_file(&metadata)?])?;
                files_failed.extend(update.failed);
            }
            _ => {
                self.progress
                    .emit(Stage::Interview, StageStatus::Skipped, "");
            }
        }

        let episode_total_cost = self.ledger.total(&episode_filter).await?;
        let templates_succeeded: Vec<String> =
            report.outcomes.iter().map(|o| o.result.template.clone()).collect();

        // Success: transcript obtained, at least one template extracted,
        // and that template's output file is on disk.
        let success = templates_succeeded
            .iter()
            .any(|t| files_written.iter().any(|f| f == &format!("{}.md", t)));

        Ok(RunSummary {
            episode_id: episode.episode_id.clone(),
            workspace: workspace.to_path_buf(),
            transcript_source: fetched.transcript.source,
            transcript_from_cache: fetched.from_cache,
            templates_succeeded,
            templates_failed: report.failures,
            files_written,
            files_failed,
            interview: interview_summary,
            interview_error,
            run_cost: episode_total_cost - cost_before,
            episode_total_cost,
            elapsed: start.elapsed(),
            success,
        })
    }
}

fn metadata_file(metadata: &WorkspaceMetadata) -> Result<OutputFile> {
    Ok(OutputFile::new(
        "episode.json",
        serde_json::to_string_pretty(metadata)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::TemplateLibrary;
    use crate::extract::{Completion, LlmProvider, ProviderRegistry};
    use crate::interview::AnswerEvent;
    use crate::ledger::MemoryLedger;
    use crate::transcript::{
        FreeTranscript, FreeTranscriptProvider, PaidTranscriber, PaidTranscription,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn episode() -> Episode {
        Episode {
            feed_id: "show".to_string(),
            episode_id: "ep1".to_string(),
            title: "Gardening for Beginners".to_string(),
            description: String::new(),
            published_at: None,
            audio_url: "https://example.com/ep1.mp3".to_string(),
            transcript_url: None,
            duration_seconds: Some(600),
        }
    }

    struct NoFree;

    #[async_trait]
    impl FreeTranscriptProvider for NoFree {
        async fn fetch_free(&self, _episode: &Episode) -> Result<Option<FreeTranscript>> {
            Ok(None)
        }
    }

    struct FixedPaid;

    #[async_trait]
    impl PaidTranscriber for FixedPaid {
        fn provider_name(&self) -> &str {
            "fake-paid"
        }

        async fn transcribe_paid(&self, _episode: &Episode) -> Result<PaidTranscription> {
            Ok(PaidTranscription {
                text: "Hello world".to_string(),
                language: Some("en".to_string()),
                cost: 0.02,
            })
        }
    }

    /// Provider whose responses satisfy both default templates.
    struct UniversalProvider {
        calls: AtomicUsize,
        fail_template: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for UniversalProvider {
        fn name(&self) -> &str {
            "universal"
        }

        async fn complete(&self, _system: &str, user: &str) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref marker) = self.fail_template {
                if user.contains(marker) {
                    return Ok(Completion {
                        text: "not json".to_string(),
                        cost: 0.001,
                    });
                }
            }
            Ok(Completion {
                text: r#"{"summary": "About things.", "topics": ["things"],
                          "quotes": [{"text": "well said", "context": "mid-show"}]}"#
                    .to_string(),
                cost: 0.01,
            })
        }
    }

    struct CollectingSink {
        events: Mutex<Vec<(Stage, StageStatus)>>,
    }

    impl ProgressSink for CollectingSink {
        fn emit(&self, stage: Stage, status: StageStatus, _detail: &str) {
            self.events.lock().unwrap().push((stage, status));
        }
    }

    fn pipeline_with(
        provider: Arc<UniversalProvider>,
        progress: Arc<dyn ProgressSink>,
        interview: bool,
    ) -> Pipeline {
        let settings = Settings::default();
        let cache = Arc::new(MemoryCache::new());
        let ledger = Arc::new(MemoryLedger::new());

        let fetcher = TranscriptFetcher::new(
            Some(Arc::new(NoFree)),
            Some(Arc::new(FixedPaid)),
            cache.clone(),
            ledger.clone(),
            None,
        );

        let mut registry = ProviderRegistry::new("universal");
        registry.register(provider.clone());
        let engine = ExtractionEngine::new(
            TemplateLibrary::load(None).unwrap(),
            registry,
            cache,
            ledger.clone(),
            2,
            "v1",
            None,
        );

        let interviewer = if interview {
            Some(InterviewRunner::new(provider, ledger.clone(), 5, 3, 8000))
        } else {
            None
        };

        Pipeline::new(settings, fetcher, engine, interviewer, ledger, progress)
    }

    #[tokio::test]
    async fn test_full_run_writes_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(UniversalProvider {
            calls: AtomicUsize::new(0),
            fail_template: None,
        });
        let pipeline = pipeline_with(provider, Arc::new(NullProgress), false);

        let summary = pipeline
            .run(&episode(), dir.path(), None, &RunOptions::default())
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.transcript_source, TranscriptSource::Paid);
        assert_eq!(summary.templates_succeeded, vec!["summary", "quotes"]);
        assert!(summary.templates_failed.is_empty());

        assert!(dir.path().join("summary.md").exists());
        assert!(dir.path().join("quotes.md").exists());

        let metadata: WorkspaceMetadata = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("episode.json")).unwrap(),
        )
        .unwrap();
        assert!(metadata.total_cost >= 0.02);
        assert_eq!(metadata.templates.len(), 2);
        assert!(summary.run_cost >= 0.02);
    }

    #[tokio::test]
    async fn test_template_failure_is_partial_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // The quotes prompt mentions "quotable"/"quotes"; fail anything
        // containing its distinctive instruction text.
        let provider = Arc::new(UniversalProvider {
            calls: AtomicUsize::new(0),
            fail_template: Some("Extract the best quotes".to_string()),
        });
        let pipeline = pipeline_with(provider, Arc::new(NullProgress), false);

        let summary = pipeline
            .run(&episode(), dir.path(), None, &RunOptions::default())
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.templates_succeeded, vec!["summary"]);
        assert_eq!(summary.templates_failed.len(), 1);
        assert_eq!(summary.templates_failed[0].template, "quotes");

        assert!(dir.path().join("summary.md").exists());
        assert!(!dir.path().join("quotes.md").exists());

        // The metadata explains the missing template.
        let metadata: WorkspaceMetadata = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("episode.json")).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            metadata.templates.get("quotes"),
            Some(TemplateStatus::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn test_no_transcript_is_fatal_before_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(UniversalProvider {
            calls: AtomicUsize::new(0),
            fail_template: None,
        });

        let settings = Settings::default();
        let cache = Arc::new(MemoryCache::new());
        let ledger = Arc::new(MemoryLedger::new());
        let fetcher = TranscriptFetcher::new(
            Some(Arc::new(NoFree)),
            None, // no paid strategy either
            cache.clone(),
            ledger.clone(),
            None,
        );
        let mut registry = ProviderRegistry::new("universal");
        registry.register(provider.clone());
        let engine = ExtractionEngine::new(
            TemplateLibrary::load(None).unwrap(),
            registry,
            cache,
            ledger.clone(),
            2,
            "v1",
            None,
        );
        let pipeline = Pipeline::new(
            settings,
            fetcher,
            engine,
            None,
            ledger,
            Arc::new(NullProgress),
        );

        let err = pipeline
            .run(&episode(), dir.path(), None, &RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::NotesError::NoTranscript { .. }));

        // Extraction never ran and nothing was written.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("episode.json").exists());
    }

    #[tokio::test]
    async fn test_progress_events_in_stage_order() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(UniversalProvider {
            calls: AtomicUsize::new(0),
            fail_template: None,
        });
        let sink = Arc::new(CollectingSink {
            events: Mutex::new(Vec::new()),
        });
        let pipeline = pipeline_with(provider, sink.clone(), false);

        pipeline
            .run(&episode(), dir.path(), None, &RunOptions::default())
            .await
            .unwrap();

        let events = sink.events.lock().unwrap();
        let stages: Vec<Stage> = events.iter().map(|(s, _)| *s).collect();
        assert_eq!(stages[0], Stage::Transcript);
        assert!(stages.contains(&Stage::Selection));
        assert!(stages.contains(&Stage::Extraction));
        assert!(stages.contains(&Stage::Write));
        assert_eq!(*stages.last().unwrap(), Stage::Interview); // skipped
        assert_eq!(events.last().unwrap().1, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn test_interview_runs_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(UniversalProvider {
            calls: AtomicUsize::new(0),
            fail_template: None,
        });
        let pipeline = pipeline_with(provider, Arc::new(NullProgress), true);

        struct TwoAnswers {
            remaining: usize,
        }

        #[async_trait]
        impl AnswerSource for TwoAnswers {
            async fn next_answer(&mut self, _turn: usize, _q: &str) -> Result<AnswerEvent> {
                if self.remaining == 0 {
                    Ok(AnswerEvent::Exit)
                } else {
                    self.remaining -= 1;
                    Ok(AnswerEvent::Answer("noted".to_string()))
                }
            }
        }

        let mut answers = TwoAnswers { remaining: 2 };
        let summary = pipeline
            .run(
                &episode(),
                dir.path(),
                Some(&mut answers),
                &RunOptions {
                    template_override: None,
                    run_interview: true,
                },
            )
            .await
            .unwrap();

        let interview = summary.interview.unwrap();
        assert_eq!(interview.state, InterviewState::Abandoned);
        assert_eq!(interview.turns, 2);
        assert!(dir.path().join("interview.md").exists());

        // Metadata was updated with the interview outcome.
        let metadata: WorkspaceMetadata = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("episode.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata.interview.unwrap().turns, 2);
    }

    #[tokio::test]
    async fn test_template_override_replaces_selection() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(UniversalProvider {
            calls: AtomicUsize::new(0),
            fail_template: None,
        });
        let pipeline = pipeline_with(provider, Arc::new(NullProgress), false);

        let summary = pipeline
            .run(
                &episode(),
                dir.path(),
                None,
                &RunOptions {
                    template_override: Some(vec!["summary".to_string()]),
                    run_interview: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(summary.templates_succeeded, vec!["summary"]);
        assert!(!dir.path().join("quotes.md").exists());
    }
}
