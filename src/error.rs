//! User-facing error taxonomy.
//!
//! Library internals propagate `anyhow::Error`. At the session boundary
//! every failure is classified into a [`DocQaError`] so the shells (CLI and
//! HTTP) can render a short message and decide which state, if any, was
//! touched.

use thiserror::Error;

/// Message shown when Submit & Process is triggered with nothing uploaded.
pub const NO_DOCUMENTS_MESSAGE: &str = "Please upload at least one PDF file.";
/// Message shown when a question arrives before any session exists.
pub const NO_SESSION_MESSAGE: &str = "Please upload PDFs and click Submit & Process first.";

#[derive(Debug, Error)]
pub enum DocQaError {
    #[error("{}", NO_DOCUMENTS_MESSAGE)]
    NoDocuments,

    #[error("Please enter a question.")]
    EmptyQuestion,

    #[error("{}", NO_SESSION_MESSAGE)]
    NoSession,

    #[error("'{0}' is not a PDF file")]
    NotAPdf(String),

    #[error("failed to read PDF '{name}': {reason}")]
    Pdf { name: String, reason: String },

    #[error("no text could be extracted from the uploaded documents; nothing to index")]
    EmptyIndex,

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("index build failed: {0}")]
    Index(String),

    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),

    #[error("generation timed out after {0}s")]
    Timeout(u64),
}

/// Which part of the system an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any pipeline call; nothing changed.
    Input,
    /// Submit & Process aborted; the previous session (if any) is intact.
    Build,
    /// Ask aborted; transcript and memory are intact.
    Generation,
}

impl DocQaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocQaError::NoDocuments
            | DocQaError::EmptyQuestion
            | DocQaError::NoSession
            | DocQaError::NotAPdf(_) => ErrorKind::Input,
            DocQaError::Pdf { .. }
            | DocQaError::EmptyIndex
            | DocQaError::Embedding(_)
            | DocQaError::Index(_) => ErrorKind::Build,
            DocQaError::Generation(_) | DocQaError::Timeout(_) => ErrorKind::Generation,
        }
    }

    /// One-line message for the shells.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Input => self.to_string(),
            ErrorKind::Build => format!("Processing failed: {}", self),
            ErrorKind::Generation => format!("Could not answer: {}", self),
        }
    }
}
