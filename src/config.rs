//! TOML configuration.
//!
//! Every section is optional; missing keys fall back to the defaults below,
//! which reproduce the tool's reference behavior (500/50 character chunks,
//! top-4 retrieval, `all-minilm-l6-v2` embeddings, `gemini-1.5-pro` answers).
//!
//! ```toml
//! [chunking]
//! chunk_size = 500
//! chunk_overlap = 50
//!
//! [retrieval]
//! top_k = 4
//!
//! [generation]
//! model = "gemini-1.5-pro"
//! api_key_env = "GOOGLE_API_KEY"
//! timeout_secs = 60
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractionConfig {
    /// Skip PDFs that fail to parse instead of aborting the whole batch.
    #[serde(default)]
    pub skip_unreadable: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the model per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    /// Rewrite follow-up questions into standalone ones before retrieval.
    #[serde(default = "default_condense_question")]
    pub condense_question: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            condense_question: default_condense_question(),
        }
    }
}

fn default_condense_question() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            temperature: None,
        }
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_generation_model() -> String {
    "gemini-1.5-pro".to_string()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

/// Load and validate a config file.
///
/// A missing file is not an error: the built-in defaults are returned so
/// the tool works out of the box. A file that exists but fails to parse or
/// validate is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Upper bound for `generation.retry_base_delay_ms` (one minute).
const MAX_RETRY_BASE_DELAY_MS: u64 = 60_000;

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.provider.as_str() {
        "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "gemini" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be gemini.",
            other
        ),
    }
    if config.generation.timeout_secs == 0 {
        bail!("generation.timeout_secs must be > 0");
    }
    if config.generation.retry_base_delay_ms > MAX_RETRY_BASE_DELAY_MS {
        bail!(
            "generation.retry_base_delay_ms ({}) must be at most {}",
            config.generation.retry_base_delay_ms,
            MAX_RETRY_BASE_DELAY_MS
        );
    }
    if config.generation.api_key_env.trim().is_empty() {
        bail!("generation.api_key_env must name an environment variable");
    }
    if let Some(t) = config.generation.temperature {
        if !(0.0..=2.0).contains(&t) {
            bail!("generation.temperature must be in [0.0, 2.0]");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huge_retry_delay_rejected() {
        let err = parse_config("[generation]\nretry_base_delay_ms = 9000000000000\n")
            .unwrap_err();
        assert!(err.to_string().contains("retry_base_delay_ms"), "{}", err);
        assert!(parse_config("[generation]\nretry_base_delay_ms = 60000\n").is_ok());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.chunking.chunk_size, 500);
        assert_eq!(cfg.chunking.chunk_overlap, 50);
        assert_eq!(cfg.retrieval.top_k, 4);
        assert_eq!(cfg.embedding.model, "all-minilm-l6-v2");
        assert_eq!(cfg.generation.model, "gemini-1.5-pro");
        assert_eq!(cfg.generation.api_key_env, "GOOGLE_API_KEY");
        assert!(cfg.conversation.condense_question);
        assert!(!cfg.extraction.skip_unreadable);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = load_config(Path::new("/definitely/not/here/docqa.toml")).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:8501");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_config("[retrieval]\ntop_k = 8\n\n[generation]\nmodel = \"gemini-1.5-flash\"\n")
            .unwrap();
        assert_eq!(cfg.retrieval.top_k, 8);
        assert_eq!(cfg.generation.model, "gemini-1.5-flash");
        assert_eq!(cfg.generation.max_retries, 3);
        assert_eq!(cfg.chunking.chunk_size, 500);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let err = parse_config("[chunking]\nchunk_size = 50\nchunk_overlap = 50\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn zero_top_k_rejected() {
        let err = parse_config("[retrieval]\ntop_k = 0\n").unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn unknown_providers_rejected() {
        let err = parse_config("[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
        let err = parse_config("[generation]\nprovider = \"llama\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown generation provider"));
    }
}
