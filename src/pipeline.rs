//! Submit & Process: uploaded PDFs → ready [`ConversationalSession`].
//!
//! ```text
//! UploadedPdf[] ─▶ extract ─▶ split_text ─▶ VectorIndex::build ─▶ session
//! ```
//!
//! Every stage either succeeds or aborts the whole build; nothing partial
//! is ever handed to the caller.

use std::sync::Arc;

use anyhow::Result;

use crate::chunk::split_text;
use crate::config::Config;
use crate::conversation::{ConversationalSession, SessionSettings};
use crate::embedding::{create_embedder, Embedder};
use crate::error::DocQaError;
use crate::extract::{extract_documents, ExtractError};
use crate::generation::{create_generator, Generator};
use crate::index::VectorIndex;
use crate::models::{Chunk, ProcessSummary, UploadedPdf};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};

/// Extracted and chunked batch, before any embedding.
#[derive(Debug)]
pub struct PreparedBatch {
    pub documents: usize,
    pub skipped: Vec<String>,
    pub pages: usize,
    pub characters: usize,
    pub chunks: Vec<Chunk>,
}

/// Extract and chunk a batch. No model is touched.
pub fn prepare_batch(
    docs: &[UploadedPdf],
    config: &Config,
    progress: &dyn ProgressReporter,
) -> Result<PreparedBatch, DocQaError> {
    if docs.is_empty() {
        return Err(DocQaError::NoDocuments);
    }

    progress.report(ProgressEvent::Extracting {
        documents: docs.len(),
    });
    let extracted = extract_documents(docs, config.extraction.skip_unreadable).map_err(
        |e| match e {
            ExtractError::Pdf { name, reason } => DocQaError::Pdf { name, reason },
        },
    )?;

    let characters = extracted.text.chars().count();
    progress.report(ProgressEvent::Chunking { characters });
    let chunks = split_text(&extracted.text, &config.chunking);

    tracing::info!(
        documents = docs.len(),
        skipped = extracted.skipped.len(),
        pages = extracted.pages,
        characters,
        chunks = chunks.len(),
        "prepared batch"
    );

    Ok(PreparedBatch {
        documents: docs.len() - extracted.skipped.len(),
        skipped: extracted.skipped,
        pages: extracted.pages,
        characters,
        chunks,
    })
}

/// Everything needed to turn uploads into a session.
pub struct Pipeline {
    config: Config,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    progress: Box<dyn ProgressReporter>,
}

impl Pipeline {
    /// Build providers from config.
    ///
    /// Fails fast when the generation credential is missing, before any
    /// document is processed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let generator = create_generator(&config.generation)?;
        let embedder = create_embedder(&config.embedding)?;
        tracing::info!(
            embedding_model = embedder.model_name(),
            generation_model = generator.model_name(),
            "pipeline configured"
        );
        Ok(Self::new(config.clone(), embedder, generator))
    }

    pub fn new(config: Config, embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Self {
        Self {
            config,
            embedder,
            generator,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run extraction → chunking → index build and return a fresh session.
    pub async fn build_session(
        &self,
        docs: Vec<UploadedPdf>,
    ) -> Result<(ConversationalSession, ProcessSummary), DocQaError> {
        let batch = prepare_batch(&docs, &self.config, self.progress.as_ref())?;
        drop(docs);

        // Whitespace-only text (e.g. image-only pages) has nothing to retrieve.
        if batch.chunks.iter().all(|c| c.text.trim().is_empty()) {
            return Err(DocQaError::EmptyIndex);
        }

        let chunk_count = batch.chunks.len();
        self.progress.report(ProgressEvent::Embedding {
            chunks: chunk_count,
        });
        let started = std::time::Instant::now();
        let index = VectorIndex::build(batch.chunks, self.embedder.as_ref()).await?;
        tracing::info!(
            chunks = index.len(),
            dims = index.dims(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index built"
        );

        let summary = ProcessSummary {
            documents: batch.documents,
            skipped: batch.skipped,
            characters: batch.characters,
            chunks: index.len(),
            dims: index.dims(),
        };

        let session = ConversationalSession::new(
            index,
            Arc::clone(&self.embedder),
            Arc::clone(&self.generator),
            SessionSettings {
                top_k: self.config.retrieval.top_k,
                condense_question: self.config.conversation.condense_question,
            },
        );

        self.progress.report(ProgressEvent::Ready {
            chunks: chunk_count,
        });
        Ok((session, summary))
    }
}
