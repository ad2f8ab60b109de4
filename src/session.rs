//! Session state shared by the interactive shell and the HTTP server.
//!
//! [`SessionState`] is an explicit value handed to each action handler. It
//! holds at most one [`ConversationalSession`] and the chat transcript:
//!
//! | State | `submit_and_process` | `ask` |
//! |-------|----------------------|-------|
//! | uninitialized | build → ready | rejected, nothing changes |
//! | ready | rebuild, replaces the session on success | answer appended |
//!
//! A failed action never changes the state.

use crate::conversation::ConversationalSession;
use crate::error::DocQaError;
use crate::models::{ChainOutput, ProcessSummary, Role, TranscriptEntry, UploadedPdf};
use crate::pipeline::Pipeline;

/// Shown instead of the transcript when nothing has been asked yet.
pub const EMPTY_TRANSCRIPT_MESSAGE: &str =
    "No conversation yet. Upload PDFs and click Submit & Process to start.";

#[derive(Default)]
pub struct SessionState {
    session: Option<ConversationalSession>,
    transcript: Vec<TranscriptEntry>,
    last_output: Option<ChainOutput>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&ConversationalSession> {
        self.session.as_ref()
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Output of the most recent successful ask, including its sources.
    pub fn last_output(&self) -> Option<&ChainOutput> {
        self.last_output.as_ref()
    }

    /// Build a new session from `docs`, replacing the current one. The
    /// transcript is kept; the last answer's sources are dropped.
    ///
    /// With no documents this returns [`DocQaError::NoDocuments`] without
    /// touching the pipeline. On any build failure the previous session,
    /// if any, stays active.
    pub async fn submit_and_process(
        &mut self,
        docs: Vec<UploadedPdf>,
        pipeline: &Pipeline,
    ) -> Result<ProcessSummary, DocQaError> {
        if docs.is_empty() {
            return Err(DocQaError::NoDocuments);
        }

        let (session, summary) = pipeline.build_session(docs).await?;
        if self.session.replace(session).is_some() {
            tracing::info!("previous session replaced");
        }
        // Sources of the last answer belong to the replaced index.
        self.last_output = None;
        Ok(summary)
    }

    /// Ask a question of the current session.
    ///
    /// On success the question and answer are appended to the transcript.
    /// On failure the transcript is unchanged.
    pub async fn ask(&mut self, question: &str) -> Result<&ChainOutput, DocQaError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DocQaError::EmptyQuestion);
        }
        let session = self.session.as_mut().ok_or(DocQaError::NoSession)?;

        let output = session.ask(question).await?;

        self.transcript
            .push(TranscriptEntry::new(Role::User, question));
        self.transcript
            .push(TranscriptEntry::new(Role::Assistant, output.answer.clone()));
        let output: &ChainOutput = self.last_output.insert(output);
        Ok(output)
    }

    /// Drop the session and clear the transcript.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Render the transcript for a terminal.
    pub fn render_transcript(&self) -> String {
        render_transcript(&self.transcript)
    }
}

/// `You:` / `Bot:` lines, or the empty-state hint.
pub fn render_transcript(entries: &[TranscriptEntry]) -> String {
    if entries.is_empty() {
        return EMPTY_TRANSCRIPT_MESSAGE.to_string();
    }
    entries
        .iter()
        .map(|e| match e.role {
            Role::User => format!("You: {}", e.text),
            Role::Assistant => format!("Bot: {}", e.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
