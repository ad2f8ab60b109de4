//! Core data types that flow through the processing and question pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// An uploaded PDF: display name plus raw bytes.
///
/// Lives only for the duration of one Submit & Process action.
#[derive(Debug, Clone)]
pub struct UploadedPdf {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedPdf {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Cheap content sniff: PDF files start with `%PDF-`.
    pub fn looks_like_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF-")
    }
}

/// A bounded slice of the extracted text. Identity is its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub position: usize,
    pub text: String,
}

/// A chunk returned by the retriever, with its cosine similarity.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub position: usize,
    pub text: String,
    pub score: f32,
}

/// One completed question/answer pair in conversation memory.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

/// Result of one conversational turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChainOutput {
    pub answer: String,
    pub source_documents: Vec<RetrievedChunk>,
    /// The rewritten question used for retrieval when it differs from the
    /// one that was asked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standalone_question: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One line of the chat transcript shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Summary of a successful Submit & Process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub documents: usize,
    pub skipped: Vec<String>,
    pub characters: usize,
    pub chunks: usize,
    pub dims: usize,
}
