//! In-memory vector index over one batch of chunks.
//!
//! The index is built once from the full chunk set and never mutated;
//! processing a new batch builds a new index. Retrieval is exact:
//! brute-force cosine similarity over all stored vectors.

use anyhow::Result;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::DocQaError;
use crate::models::{Chunk, RetrievedChunk};

struct Entry {
    position: usize,
    text: String,
    vector: Vec<f32>,
}

pub struct VectorIndex {
    entries: Vec<Entry>,
    dims: usize,
}

impl VectorIndex {
    /// Embed every chunk with `embed_documents` and store the pairs.
    ///
    /// # Errors
    ///
    /// - [`DocQaError::EmptyIndex`] when `chunks` is empty.
    /// - [`DocQaError::Embedding`] when the embedder fails.
    /// - [`DocQaError::Index`] when the embedder returns the wrong number of
    ///   vectors or vectors of inconsistent length.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<Self, DocQaError> {
        if chunks.is_empty() {
            return Err(DocQaError::EmptyIndex);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed_documents(&texts)
            .await
            .map_err(DocQaError::Embedding)?;

        Self::from_vectors(chunks, vectors)
    }

    /// Pair chunks with precomputed vectors.
    pub fn from_vectors(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self, DocQaError> {
        if chunks.is_empty() {
            return Err(DocQaError::EmptyIndex);
        }
        if vectors.len() != chunks.len() {
            return Err(DocQaError::Index(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let dims = vectors[0].len();
        if dims == 0 {
            return Err(DocQaError::Index("embedder returned empty vectors".to_string()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(DocQaError::Index(format!(
                "vector size mismatch: got {}, want {}",
                bad.len(),
                dims
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| Entry {
                position: chunk.position,
                text: chunk.text,
                vector,
            })
            .collect();

        Ok(Self { entries, dims })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// The `k` stored chunks most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order.
    pub fn retrieve(&self, query: &[f32], k: usize) -> Vec<RetrievedChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();

        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let e = &self.entries[i];
                RetrievedChunk {
                    position: e.position,
                    text: e.text.clone(),
                    score,
                }
            })
            .collect()
    }

    /// Embed `query` and retrieve the top `k` chunks.
    pub async fn search(
        &self,
        query: &str,
        embedder: &dyn Embedder,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let vector = embedder.embed_query(query).await?;
        let hits = self.retrieve(&vector, k);
        if let Some(top) = hits.first() {
            tracing::debug!(k, top_score = top.score, top_position = top.position, "retrieved");
        }
        Ok(hits)
    }
}
