//! Conversational retrieval over one processed batch.
//!
//! A [`ConversationalSession`] owns the batch's [`VectorIndex`], a handle to
//! the embedder and generator, and the conversation memory. Each
//! [`ask`](ConversationalSession::ask) runs:
//!
//! ```text
//! question ─┬─ (history non-empty) ─▶ condense ─▶ standalone question
//!           ▼
//!      embed_query ─▶ retrieve top-k ─▶ answer prompt ─▶ generate
//!                                                          │
//!                                     memory += (question, answer)
//! ```
//!
//! Memory is only appended after generation succeeds, so a failed turn
//! leaves no trace.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::DocQaError;
use crate::generation::{Generator, TimedOut};
use crate::index::VectorIndex;
use crate::models::{ChainOutput, Exchange, RetrievedChunk};

/// Knobs for one session, taken from `[retrieval]` and `[conversation]`.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub top_k: usize,
    pub condense_question: bool,
}

pub struct ConversationalSession {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    memory: Vec<Exchange>,
    settings: SessionSettings,
}

impl ConversationalSession {
    pub fn new(
        index: VectorIndex,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            generator,
            memory: Vec::new(),
            settings,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn memory(&self) -> &[Exchange] {
        &self.memory
    }

    /// Answer a question against the indexed batch.
    ///
    /// # Errors
    ///
    /// Any embedding, retrieval or generation failure is returned as
    /// [`DocQaError::Generation`] (or [`DocQaError::Timeout`]); memory is
    /// unchanged in that case.
    pub async fn ask(&mut self, question: &str) -> Result<ChainOutput, DocQaError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DocQaError::EmptyQuestion);
        }

        let standalone = if self.settings.condense_question && !self.memory.is_empty() {
            let prompt = condense_prompt(&self.memory, question);
            let rewritten = self
                .generator
                .generate(&prompt)
                .await
                .map_err(classify_generation_error)?;
            let rewritten = rewritten.trim().to_string();
            if rewritten.is_empty() {
                None
            } else {
                Some(rewritten)
            }
        } else {
            None
        };
        let retrieval_query = standalone.as_deref().unwrap_or(question);

        let sources = self
            .index
            .search(retrieval_query, self.embedder.as_ref(), self.settings.top_k)
            .await
            .map_err(DocQaError::Generation)?;

        let prompt = answer_prompt(&sources, &self.memory, retrieval_query);
        tracing::debug!(
            prompt_chars = prompt.len(),
            sources = sources.len(),
            model = self.generator.model_name(),
            "generating answer"
        );

        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(classify_generation_error)?;
        let answer = answer.trim().to_string();

        self.memory.push(Exchange {
            question: question.to_string(),
            answer: answer.clone(),
        });

        Ok(ChainOutput {
            answer,
            source_documents: sources,
            standalone_question: standalone.filter(|s| s != question),
        })
    }
}

fn classify_generation_error(err: anyhow::Error) -> DocQaError {
    match err.downcast_ref::<TimedOut>() {
        Some(TimedOut(secs)) => DocQaError::Timeout(*secs),
        None => DocQaError::Generation(err),
    }
}

fn render_history(memory: &[Exchange]) -> String {
    let mut out = String::new();
    for ex in memory {
        out.push_str("Human: ");
        out.push_str(&ex.question);
        out.push_str("\nAssistant: ");
        out.push_str(&ex.answer);
        out.push('\n');
    }
    out
}

/// Prompt asking the model to rewrite a follow-up as a standalone question.
pub fn condense_prompt(memory: &[Exchange], question: &str) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
         question to be a standalone question, in its original language. Reply with the \
         question only.\n\nChat History:\n{}\nFollow Up Input: {}\nStandalone question:",
        render_history(memory),
        question
    )
}

/// Prompt combining retrieved context, prior turns and the question.
pub fn answer_prompt(sources: &[RetrievedChunk], memory: &[Exchange], question: &str) -> String {
    let context = sources
        .iter()
        .map(|s| s.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = String::from(
        "Use the following pieces of context to answer the question at the end. If you \
         don't know the answer, just say that you don't know, don't try to make up an \
         answer.\n\n",
    );
    prompt.push_str("Context:\n");
    prompt.push_str(&context);
    prompt.push_str("\n\n");
    if !memory.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(&render_history(memory));
        prompt.push('\n');
    }
    prompt.push_str("Question: ");
    prompt.push_str(question);
    prompt.push_str("\nHelpful Answer:");
    prompt
}
