//! Interactive interview sessions.
//!
//! A bounded-turn conversational loop that asks the listener reflective
//! questions about the episode. Each question is generated from the
//! transcript, the extraction results, and only the most recent turns; the
//! full history is deliberately not retained in the prompt.
//!
//! Every completed turn is flushed to durable storage as soon as the
//! answer arrives, so an interrupt never loses more than the turn in
//! flight.

use crate::episode::Episode;
use crate::error::{NotesError, Result};
use crate::extract::{ExtractionResult, LlmProvider};
use crate::ledger::{CostLedger, CostRecord, OperationKind};
use crate::transcript::Transcript;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// System prompt for interview question generation.
const INTERVIEW_SYSTEM_PROMPT: &str = r#"You are interviewing a podcast listener about an episode they just heard. Your questions help them reflect and capture their own thinking.

Guidelines:
- Ask one question at a time, no preamble
- Build on the listener's previous answers when there are any
- Prefer questions about how the episode's ideas apply to the listener's own work and life
- Never quiz the listener on recall; this is reflection, not a test
- Keep questions to one or two sentences"#;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewState {
    Active,
    /// Max turns reached or the user signalled they were done.
    Completed,
    /// Explicit user exit.
    Abandoned,
}

impl std::fmt::Display for InterviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterviewState::Active => write!(f, "active"),
            InterviewState::Completed => write!(f, "completed"),
            InterviewState::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// One question/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewTurn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

/// A complete interview session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub episode_id: String,
    pub turns: Vec<InterviewTurn>,
    pub state: InterviewState,
}

/// What the answer source produced for a question.
#[derive(Debug, Clone)]
pub enum AnswerEvent {
    /// The user answered; the turn is recorded.
    Answer(String),
    /// The user signalled completion; the pending question is dropped.
    Done,
    /// Explicit exit; the session is abandoned.
    Exit,
}

/// Collaborator interface: where answers come from (terminal, test script).
///
/// The session suspends on `next_answer` with no timeout; cancellation is
/// expressed by returning `Exit`, after which all completed turns are
/// already durable.
#[async_trait]
pub trait AnswerSource: Send {
    async fn next_answer(&mut self, turn: usize, question: &str) -> Result<AnswerEvent>;
}

/// Durable, incremental storage for interview notes.
///
/// Turns are appended and synced one at a time; the file is readable
/// markdown at every point in the session.
pub struct InterviewStore {
    path: PathBuf,
}

impl InterviewStore {
    pub fn new(workspace: &Path) -> Self {
        Self {
            path: workspace.join("interview.md"),
        }
    }

    /// Path of the notes file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start the notes file with a header, replacing any previous session.
    pub fn begin(&self, episode: &Episode) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(&self.path)?;
        writeln!(file, "# Interview notes - {}\n", episode.title)?;
        file.sync_all()?;
        Ok(())
    }

    /// Append one completed turn and sync it to disk.
    pub fn append_turn(&self, turn_index: usize, turn: &InterviewTurn) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)?;
        writeln!(file, "## Q{}: {}\n", turn_index + 1, turn.question)?;
        writeln!(file, "{}\n", turn.answer)?;
        file.sync_all()?;
        Ok(())
    }

    /// Append the terminal state marker.
    pub fn finish(&self, state: InterviewState) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)?;
        writeln!(file, "---\nSession {}.", state)?;
        file.sync_all()?;
        Ok(())
    }
}

/// Runs interview sessions.
pub struct InterviewRunner {
    provider: Arc<dyn LlmProvider>,
    ledger: Arc<dyn CostLedger>,
    max_turns: usize,
    context_turns: usize,
    max_transcript_chars: usize,
}

impl InterviewRunner {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        ledger: Arc<dyn CostLedger>,
        max_turns: usize,
        context_turns: usize,
        max_transcript_chars: usize,
    ) -> Self {
        Self {
            provider,
            ledger,
            max_turns: max_turns.max(1),
            context_turns,
            max_transcript_chars,
        }
    }

    /// Run a session to a terminal state.
    ///
    /// Each turn's cost is recorded individually; each completed turn is
    /// flushed through the store before the next question is generated.
    #[instrument(skip_all, fields(episode_id = %episode.episode_id))]
    pub async fn run(
        &self,
        episode: &Episode,
        transcript: &Transcript,
        extractions: &[ExtractionResult],
        answers: &mut dyn AnswerSource,
        store: &InterviewStore,
    ) -> Result<InterviewSession> {
        store.begin(episode)?;

        let mut session = InterviewSession {
            episode_id: episode.episode_id.clone(),
            turns: Vec::new(),
            state: InterviewState::Active,
        };

        info!("Starting interview (max {} turns)", self.max_turns);

        while session.state == InterviewState::Active && session.turns.len() < self.max_turns {
            let turn_index = session.turns.len();
            let prompt = self.question_prompt(episode, transcript, extractions, &session.turns);

            let completion = self.provider.complete(INTERVIEW_SYSTEM_PROMPT, &prompt).await?;
            let question = completion.text.trim().to_string();
            if question.is_empty() {
                return Err(NotesError::Interview(
                    "Question generation returned empty text".to_string(),
                ));
            }

            self.ledger
                .record(CostRecord::new(
                    OperationKind::Interview,
                    self.provider.name(),
                    completion.cost,
                    &episode.episode_id,
                ))
                .await?;

            debug!("Turn {}: {}", turn_index + 1, question);

            match answers.next_answer(turn_index, &question).await? {
                AnswerEvent::Answer(answer) => {
                    let turn = InterviewTurn {
                        question,
                        answer,
                        asked_at: Utc::now(),
                    };
                    store.append_turn(turn_index, &turn)?;
                    session.turns.push(turn);
                }
                AnswerEvent::Done => {
                    session.state = InterviewState::Completed;
                }
                AnswerEvent::Exit => {
                    session.state = InterviewState::Abandoned;
                }
            }
        }

        if session.state == InterviewState::Active {
            session.state = InterviewState::Completed;
        }

        store.finish(session.state)?;
        info!(
            "Interview {} after {} turns",
            session.state,
            session.turns.len()
        );

        Ok(session)
    }

    /// Build the question prompt from a bounded context window: truncated
    /// transcript, extraction summaries, and only the last `context_turns`
    /// prior turns.
    fn question_prompt(
        &self,
        episode: &Episode,
        transcript: &Transcript,
        extractions: &[ExtractionResult],
        turns: &[InterviewTurn],
    ) -> String {
        let mut prompt = format!("Episode: {}\n\n", episode.title);

        let text = if transcript.text.len() > self.max_transcript_chars {
            // Truncate on a char boundary.
            let mut end = self.max_transcript_chars;
            while !transcript.text.is_char_boundary(end) {
                end -= 1;
            }
            &transcript.text[..end]
        } else {
            &transcript.text
        };
        prompt.push_str(&format!("Transcript (may be truncated):\n{}\n\n", text));

        if !extractions.is_empty() {
            prompt.push_str("Notes already extracted:\n");
            for extraction in extractions {
                prompt.push_str(&format!(
                    "- {}: {}\n",
                    extraction.template,
                    serde_json::to_string(&extraction.fields).unwrap_or_default()
                ));
            }
            prompt.push('\n');
        }

        let window_start = turns.len().saturating_sub(self.context_turns);
        let recent = &turns[window_start..];
        if recent.is_empty() {
            prompt.push_str("This is the first question. Open the reflection.\n");
        } else {
            prompt.push_str("Recent conversation:\n");
            for turn in recent {
                prompt.push_str(&format!("Q: {}\nA: {}\n", turn.question, turn.answer));
            }
            prompt.push_str("\nAsk the next question.\n");
        }

        prompt
    }
}
