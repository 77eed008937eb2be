//! Process command: run the full pipeline for one episode.

use crate::cache::SqliteCache;
use crate::cli::preflight::{self, Operation};
use crate::cli::{format_elapsed, Output};
use crate::config::{ProviderSettings, Settings, TemplateLibrary};
use crate::episode::Episode;
use crate::error::{NotesError, Result};
use crate::extract::{select_templates, ExtractionEngine, OpenAiProvider, ProviderRegistry};
use crate::interview::{AnswerEvent, AnswerSource, InterviewRunner};
use crate::ledger::SqliteLedger;
use crate::pipeline::{Pipeline, ProgressSink, RunOptions, Stage, StageStatus};
use crate::transcript::{HttpFreeProvider, TranscriptFetcher, WhisperTranscriber};
use async_trait::async_trait;
use console::style;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Run the process command.
pub async fn run_process(
    episode_path: &str,
    templates: Option<String>,
    interview: bool,
    dry_run: bool,
    settings: Settings,
) -> Result<()> {
    let episode = Episode::from_json_file(Path::new(episode_path))?;
    Output::info(&format!("Episode: {}", episode.title));

    let override_templates: Option<Vec<String>> = templates.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    });

    if dry_run {
        return run_dry(&episode, override_templates.as_deref(), &settings);
    }

    preflight::check(Operation::Process)?;

    let cache = Arc::new(SqliteCache::new(&settings.cache_path())?);
    let ledger = Arc::new(SqliteLedger::new(&settings.ledger_path())?);

    let free: Option<Arc<dyn crate::transcript::FreeTranscriptProvider>> =
        if settings.transcription.try_free_first {
            Some(Arc::new(HttpFreeProvider::new()))
        } else {
            None
        };
    let paid = Arc::new(WhisperTranscriber::with_config(
        &settings.transcription.paid_model,
        settings.transcription.paid_price_per_minute,
        settings.transcription.language.clone(),
    ));
    let fetcher = TranscriptFetcher::new(
        free,
        Some(paid),
        cache.clone(),
        ledger.clone(),
        ttl_days(settings.storage.transcript_ttl_days),
    );

    let library = TemplateLibrary::load(settings.extraction.custom_template_dir.as_deref())?;
    let registry = build_registry(&settings);
    let engine = ExtractionEngine::new(
        library,
        registry,
        cache,
        ledger.clone(),
        settings.extraction.max_concurrent,
        &settings.extraction.prompt_version,
        ttl_days(settings.storage.extraction_ttl_days),
    );

    let interviewer = if interview {
        let provider_settings = settings
            .provider(&settings.interview.provider)
            .ok_or_else(|| NotesError::UnknownProvider(settings.interview.provider.clone()))?;
        let provider = Arc::new(OpenAiProvider::new(
            &settings.interview.provider,
            &provider_settings,
        ));
        Some(InterviewRunner::new(
            provider,
            ledger.clone(),
            settings.interview.max_turns,
            settings.interview.context_turns,
            settings.interview.max_transcript_chars,
        ))
    } else {
        None
    };

    let workspace = settings.notes_dir().join(episode.workspace_dir_name());
    Output::info(&format!("Workspace: {}", workspace.display()));

    let pipeline = Pipeline::new(
        settings,
        fetcher,
        engine,
        interviewer,
        ledger,
        Arc::new(ConsoleProgress::new()),
    );

    let mut answers = TerminalAnswers;
    let answers_ref: Option<&mut dyn AnswerSource> = if interview {
        Some(&mut answers)
    } else {
        None
    };

    let options = RunOptions {
        template_override: override_templates,
        run_interview: interview,
    };

    let summary = pipeline.run(&episode, &workspace, answers_ref, &options).await?;

    Output::header("Run summary");
    Output::kv("Transcript", &format!("{}", summary.transcript_source));
    Output::kv("Templates", &summary.templates_succeeded.join(", "));
    for failure in &summary.templates_failed {
        Output::warning(&format!("Template '{}' failed: {}", failure.template, failure.reason));
    }
    for failed in &summary.files_failed {
        Output::warning(&format!("File '{}' failed: {}", failed.name, failed.reason));
    }
    if let Some(interview) = &summary.interview {
        Output::kv(
            "Interview",
            &format!("{} ({} turns)", interview.state, interview.turns),
        );
    }
    if let Some(err) = &summary.interview_error {
        Output::warning(&format!("Interview failed: {}", err));
    }
    Output::cost("Run cost", summary.run_cost);
    Output::cost("Episode total", summary.episode_total_cost);
    Output::kv("Elapsed", &format_elapsed(summary.elapsed));

    if summary.success {
        Output::success(&format!("Notes written to {}", summary.workspace.display()));
    } else {
        Output::error("Run did not produce usable notes; see warnings above.");
    }

    Ok(())
}

/// Dry run: template selection is pure, so this costs nothing.
fn run_dry(
    episode: &Episode,
    override_templates: Option<&[String]>,
    settings: &Settings,
) -> Result<()> {
    let library = TemplateLibrary::load(settings.extraction.custom_template_dir.as_deref())?;
    let selected = select_templates(
        episode,
        &settings.extraction,
        &settings.categories,
        override_templates,
    );

    Output::header("Dry run");
    for name in &selected {
        match library.get(name) {
            Some(template) => Output::list_item(&format!(
                "{} (cost tier: {})",
                template.name, template.cost_tier
            )),
            None => Output::warning(&format!("{} (unknown template, would fail)", name)),
        }
    }
    Output::info("No paid calls were made.");
    Ok(())
}

fn ttl_days(days: Option<u32>) -> Option<Duration> {
    days.map(|d| Duration::from_secs(u64::from(d) * 86_400))
}

/// Build the provider registry from configuration. An "openai" provider is
/// always present so the default configuration works out of the box.
fn build_registry(settings: &Settings) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new(&settings.extraction.default_provider);
    for (name, provider_settings) in &settings.providers {
        registry.register(Arc::new(OpenAiProvider::new(name, provider_settings)));
    }
    if !settings.providers.contains_key("openai") {
        registry.register(Arc::new(OpenAiProvider::new(
            "openai",
            &ProviderSettings::default(),
        )));
    }
    registry
}

/// Progress sink that renders pipeline stages to the terminal.
///
/// A spinner runs while a stage is in flight and is replaced by a one-line
/// result when it settles.
struct ConsoleProgress {
    spinner: std::sync::Mutex<Option<indicatif::ProgressBar>>,
}

impl ConsoleProgress {
    fn new() -> Self {
        Self {
            spinner: std::sync::Mutex::new(None),
        }
    }

    fn clear_spinner(&self) {
        if let Ok(mut guard) = self.spinner.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn emit(&self, stage: Stage, status: StageStatus, detail: &str) {
        match status {
            StageStatus::Started => {
                let pb = Output::spinner(&format!("{}...", stage));
                if let Ok(mut guard) = self.spinner.lock() {
                    *guard = Some(pb);
                }
            }
            StageStatus::Completed => {
                self.clear_spinner();
                if detail.is_empty() {
                    eprintln!("  {} {}", style("+").green(), stage);
                } else {
                    eprintln!("  {} {}: {}", style("+").green(), stage, detail);
                }
            }
            StageStatus::Failed => {
                self.clear_spinner();
                eprintln!("  {} {}: {}", style("x").red(), stage, detail);
            }
            StageStatus::Skipped => {
                self.clear_spinner();
                eprintln!("  {} {} skipped", style("-").dim(), stage);
            }
        }
    }
}

/// Answer source backed by interactive terminal input.
///
/// Type an answer, 'done' to finish the session, or 'exit' to abandon it.
struct TerminalAnswers;

#[async_trait]
impl AnswerSource for TerminalAnswers {
    async fn next_answer(&mut self, turn: usize, question: &str) -> Result<AnswerEvent> {
        println!(
            "\n{} {}",
            style(format!("Q{}:", turn + 1)).cyan().bold(),
            question
        );

        let stdin = io::stdin();
        loop {
            print!("{} ", style("You:").green().bold());
            io::stdout().flush()?;

            let mut input = String::new();
            stdin.lock().read_line(&mut input)?;
            let input = input.trim();

            if input.is_empty() {
                continue;
            }
            if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
                return Ok(AnswerEvent::Exit);
            }
            if input.eq_ignore_ascii_case("done") {
                return Ok(AnswerEvent::Done);
            }
            return Ok(AnswerEvent::Answer(input.to_string()));
        }
    }
}
