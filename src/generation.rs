//! Hosted answer generation.
//!
//! Defines the [`Generator`] trait and [`GeminiGenerator`], a client for the
//! Google Gemini `generateContent` REST endpoint.
//!
//! # Retry Strategy
//!
//! Transient failures are retried with exponential backoff:
//! - HTTP 429 (rate limited / quota) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: `retry_base_delay_ms` × 1, 2, 4, 8, 16, 32 (capped at 2^5)
//!
//! Retrying is safe: nothing is recorded in conversation memory until a
//! call succeeds.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Produces a completion for a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-1.5-pro"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for a single-turn prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// The request did not complete within the configured timeout, on every
/// attempt.
#[derive(Debug, thiserror::Error)]
#[error("request timed out after {0}s")]
pub struct TimedOut(pub u64);

/// Read the API key from the environment variable named in config.
///
/// # Errors
///
/// Fails with `"<VAR> environment variable not set"` when the variable is
/// missing or blank, so a missing credential is reported at startup rather
/// than as an authentication error from the API.
pub fn api_key_from_env(config: &GenerationConfig) -> Result<String> {
    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("{} environment variable not set", config.api_key_env),
    }
}

// ============ Gemini ============

/// Google Gemini client.
///
/// Calls `POST {base_url}/models/{model}:generateContent` with the key in
/// the `x-goog-api-key` header.
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
    timeout_secs: u64,
    max_retries: u32,
    retry_base_delay: Duration,
    temperature: Option<f32>,
}

impl GeminiGenerator {
    /// Create a client, reading the API key from the environment.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = api_key_from_env(config)?;
        Self::with_api_key(config, api_key)
    }

    /// Create a client with an explicit API key.
    pub fn with_api_key(config: &GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        // Accept both "gemini-1.5-pro" and "models/gemini-1.5-pro".
        let model = config
            .model
            .trim_start_matches("models/")
            .to_string();
        if model.is_empty() {
            bail!("generation.model must not be empty");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let url = format!(
            "{}/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            model
        );

        Ok(Self {
            client,
            api_key: api_key.into(),
            model,
            url,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            temperature: config.temperature,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationParams>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationParams {
    temperature: f32,
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: self
                .temperature
                .map(|temperature| GenerationParams { temperature }),
        };

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.retry_base_delay, attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying generation request"
                );
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .header("x-goog-api-key", &self.api_key)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        match response.json::<serde_json::Value>().await {
                            Ok(json) => return parse_gemini_response(&json),
                            Err(e) if e.is_timeout() => {
                                last_err = Some(anyhow::Error::new(TimedOut(self.timeout_secs)));
                                continue;
                            }
                            Err(e) if e.is_decode() => {
                                bail!("Invalid Gemini response: {}", e);
                            }
                            Err(e) => {
                                last_err = Some(anyhow::anyhow!("Gemini connection error: {}", e));
                                continue;
                            }
                        }
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Gemini API error {}: {}",
                            status,
                            api_error_message(&body_text)
                        ));
                        continue;
                    }

                    // Client error (not 429): fail now
                    let body_text = response.text().await.unwrap_or_default();
                    bail!(
                        "Gemini API error {}: {}",
                        status,
                        api_error_message(&body_text)
                    );
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(anyhow::Error::new(TimedOut(self.timeout_secs)));
                    continue;
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("Gemini connection error: {}", e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Generation failed after retries")))
    }
}

/// Delay before retry `attempt` (1-based): `base` × 2^(attempt-1), with the
/// exponent capped at 5. Saturates instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(5);
    base.checked_mul(factor).unwrap_or(Duration::MAX)
}

/// Pull `error.message` out of a Gemini error body, or return it verbatim.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Parse a `generateContent` response into the answer text.
///
/// Joins the text parts of the first candidate. A response without
/// candidates (blocked prompt) or without text is an error.
pub fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let candidate = match json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    {
        Some(c) => c,
        None => {
            if let Some(reason) = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
            {
                bail!("prompt was blocked by the model: {}", reason);
            }
            bail!("Invalid Gemini response: missing candidates");
        }
    };

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .unwrap_or("unknown");
        bail!("Invalid Gemini response: no text (finishReason: {})", reason);
    }

    Ok(text)
}

/// Create the [`Generator`] named by the configuration.
///
/// # Errors
///
/// Returns an error for unknown providers or a missing API key.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backoff_doubles_then_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 6), Duration::from_millis(3200));
        assert_eq!(backoff_delay(base, 40), Duration::from_millis(3200));
    }

    #[test]
    fn backoff_saturates_on_huge_base() {
        assert_eq!(backoff_delay(Duration::MAX, 3), Duration::MAX);
    }

    #[test]
    fn parses_text_parts() {
        let resp = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Paris" }, { "text": " is the capital." }] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(parse_gemini_response(&resp).unwrap(), "Paris is the capital.");
    }

    #[test]
    fn blocked_prompt_is_error() {
        let resp = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_gemini_response(&resp).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn missing_text_is_error() {
        let resp = json!({ "candidates": [{ "finishReason": "MAX_TOKENS" }] });
        let err = parse_gemini_response(&resp).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn garbage_is_error() {
        assert!(parse_gemini_response(&json!({ "foo": 1 })).is_err());
    }

    #[test]
    fn error_message_extracted() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body), "API key not valid");
        assert_eq!(api_error_message("plain text "), "plain text");
    }

    #[test]
    fn missing_key_fails_fast() {
        let cfg = GenerationConfig {
            api_key_env: "DOCQA_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..GenerationConfig::default()
        };
        let err = create_generator(&cfg).err().unwrap();
        assert_eq!(
            err.to_string(),
            "DOCQA_TEST_KEY_THAT_IS_NEVER_SET environment variable not set"
        );
    }

    #[test]
    fn model_prefix_stripped() {
        let cfg = GenerationConfig {
            model: "models/gemini-1.5-flash".to_string(),
            base_url: "http://localhost:9/v1beta/".to_string(),
            ..GenerationConfig::default()
        };
        let g = GeminiGenerator::with_api_key(&cfg, "k").unwrap();
        assert_eq!(g.model_name(), "gemini-1.5-flash");
        assert_eq!(
            g.url,
            "http://localhost:9/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }
}
