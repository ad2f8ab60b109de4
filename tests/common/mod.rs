//! Shared fixtures: deterministic embedder and generator fakes, and a
//! minimal PDF writer.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use docqa::config::Config;
use docqa::embedding::Embedder;
use docqa::generation::Generator;
use docqa::models::UploadedPdf;
use docqa::pipeline::Pipeline;

const DIMS: usize = 128;

/// Bag-of-words embedder: each lowercase word is hashed into one of 128
/// buckets. Texts sharing words point in similar directions.
#[derive(Default)]
pub struct WordHashEmbedder {
    pub calls: AtomicUsize,
}

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut h: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    (h % DIMS as u64) as usize
}

pub fn embed_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        v[bucket(&word.to_lowercase())] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for WordHashEmbedder {
    fn model_name(&self) -> &str {
        "word-hash"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| embed_words(t)).collect())
    }
}

/// Answers with the retrieved context verbatim. Fails when the prompt
/// contains `[fail]`.
#[derive(Default)]
pub struct EchoContextGenerator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Generator for EchoContextGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("[fail]") {
            anyhow::bail!("Gemini API error 503 Service Unavailable: overloaded");
        }
        let Some(start) = prompt.find("Context:\n") else {
            anyhow::bail!("unexpected prompt: {}", prompt);
        };
        let rest = &prompt[start + "Context:\n".len()..];
        let end = ["\n\nConversation so far:", "\n\nQuestion: "]
            .iter()
            .filter_map(|m| rest.find(m))
            .min()
            .unwrap_or(rest.len());
        Ok(rest[..end].to_string())
    }
}

pub struct Fakes {
    pub embedder: Arc<WordHashEmbedder>,
    pub generator: Arc<EchoContextGenerator>,
}

/// Pipeline over the fakes, with question condensing off so every ask is
/// exactly one generator call.
pub fn fake_pipeline() -> (Pipeline, Fakes) {
    fake_pipeline_with(Config::default())
}

/// [`fake_pipeline`] on top of `config`.
pub fn fake_pipeline_with(mut config: Config) -> (Pipeline, Fakes) {
    config.conversation.condense_question = false;
    let embedder = Arc::new(WordHashEmbedder::default());
    let generator = Arc::new(EchoContextGenerator::default());
    let pipeline = Pipeline::new(config, embedder.clone(), generator.clone());
    (pipeline, Fakes { embedder, generator })
}

/// Single-page PDF whose content stream draws `text` in Helvetica.
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
pub fn minimal_pdf(text: &str) -> Vec<u8> {
    minimal_pdf_padded(text, 0)
}

/// Like [`minimal_pdf`], with a comment line of `padding` bytes after the
/// header. Object offsets account for it, so the file stays valid.
pub fn minimal_pdf_padded(text: &str, padding: usize) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", text);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    if padding > 0 {
        out.push(b'%');
        out.extend(std::iter::repeat(b'x').take(padding));
        out.push(b'\n');
    }
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

pub fn pdf_upload(name: &str, text: &str) -> UploadedPdf {
    UploadedPdf::new(name, minimal_pdf(text))
}
