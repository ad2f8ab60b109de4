//! Gemini client tests against a local fake `generateContent` endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use docqa::config::GenerationConfig;
use docqa::generation::{GeminiGenerator, Generator, TimedOut};

#[derive(Clone, Default)]
struct Fake {
    /// Responses served in order; the last one repeats.
    script: Arc<Vec<(u16, Value)>>,
    delay: Duration,
    seen: Arc<Mutex<Vec<Seen>>>,
}

#[derive(Clone)]
struct Seen {
    path: String,
    api_key: Option<String>,
    body: Value,
}

async fn fake_handler(
    State(fake): State<Fake>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let n = {
        let mut seen = fake.seen.lock().unwrap();
        seen.push(Seen {
            path: uri.path().to_string(),
            api_key: headers
                .get("x-goog-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body,
        });
        seen.len() - 1
    };
    tokio::time::sleep(fake.delay).await;
    let (status, body) = fake.script[n.min(fake.script.len() - 1)].clone();
    (StatusCode::from_u16(status).unwrap(), Json(body))
}

async fn spawn_fake(fake: Fake) -> String {
    let app = Router::new().fallback(fake_handler).with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1beta", addr)
}

fn answer(text: &str) -> Value {
    json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
    })
}

fn config(base_url: String) -> GenerationConfig {
    GenerationConfig {
        base_url,
        model: "models/gemini-test".to_string(),
        timeout_secs: 5,
        max_retries: 2,
        retry_base_delay_ms: 10,
        ..GenerationConfig::default()
    }
}

#[tokio::test]
async fn sends_prompt_and_key() {
    let fake = Fake {
        script: Arc::new(vec![(200, answer("Paris."))]),
        ..Fake::default()
    };
    let seen = fake.seen.clone();
    let base = spawn_fake(fake).await;

    let gen = GeminiGenerator::with_api_key(&config(base), "test-key").unwrap();
    assert_eq!(gen.model_name(), "gemini-test");
    let text = gen.generate("What is the capital of France?").await.unwrap();
    assert_eq!(text, "Paris.");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/v1beta/models/gemini-test:generateContent");
    assert_eq!(seen[0].api_key.as_deref(), Some("test-key"));
    assert_eq!(
        seen[0].body["contents"][0]["parts"][0]["text"],
        "What is the capital of France?"
    );
}

#[tokio::test]
async fn retries_server_errors() {
    let fake = Fake {
        script: Arc::new(vec![
            (503, json!({ "error": { "message": "overloaded" } })),
            (200, answer("Recovered.")),
        ]),
        ..Fake::default()
    };
    let seen = fake.seen.clone();
    let base = spawn_fake(fake).await;

    let gen = GeminiGenerator::with_api_key(&config(base), "k").unwrap();
    assert_eq!(gen.generate("hi").await.unwrap(), "Recovered.");
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let fake = Fake {
        script: Arc::new(vec![(400, json!({ "error": { "message": "API key not valid" } }))]),
        ..Fake::default()
    };
    let seen = fake.seen.clone();
    let base = spawn_fake(fake).await;

    let gen = GeminiGenerator::with_api_key(&config(base), "bad").unwrap();
    let err = gen.generate("hi").await.unwrap_err();
    assert!(err.to_string().contains("API key not valid"), "{}", err);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rate_limit_gives_up_after_max_retries() {
    let fake = Fake {
        script: Arc::new(vec![(429, json!({ "error": { "message": "quota exceeded" } }))]),
        ..Fake::default()
    };
    let seen = fake.seen.clone();
    let base = spawn_fake(fake).await;

    let gen = GeminiGenerator::with_api_key(&config(base), "k").unwrap();
    let err = gen.generate("hi").await.unwrap_err();
    assert!(err.to_string().contains("quota exceeded"), "{}", err);
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn slow_responses_time_out() {
    let fake = Fake {
        script: Arc::new(vec![(200, answer("too late"))]),
        delay: Duration::from_secs(3),
        ..Fake::default()
    };
    let base = spawn_fake(fake).await;

    let cfg = GenerationConfig {
        timeout_secs: 1,
        max_retries: 0,
        ..config(base)
    };
    let gen = GeminiGenerator::with_api_key(&cfg, "k").unwrap();
    let err = gen.generate("hi").await.unwrap_err();
    assert!(err.downcast_ref::<TimedOut>().is_some(), "{:#}", err);
}

#[tokio::test]
async fn blocked_prompt_is_an_error() {
    let fake = Fake {
        script: Arc::new(vec![(200, json!({ "promptFeedback": { "blockReason": "SAFETY" } }))]),
        ..Fake::default()
    };
    let base = spawn_fake(fake).await;

    let gen = GeminiGenerator::with_api_key(&config(base), "k").unwrap();
    assert!(gen.generate("hi").await.is_err());
}

/// Read one HTTP request (headers plus `Content-Length` body).
async fn read_request(stream: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + length {
            return;
        }
    }
}

/// First connection sends headers and half a body, then stalls. Later
/// connections get a complete answer.
async fn spawn_stalling_server(connections: Arc<AtomicUsize>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            let n = connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                read_request(&mut stream).await;
                let body = answer("Second try.").to_string();
                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    body.len()
                );
                stream.write_all(head.as_bytes()).await.unwrap();
                if n == 0 {
                    stream.write_all(&body.as_bytes()[..body.len() / 2]).await.unwrap();
                    stream.flush().await.unwrap();
                    tokio::time::sleep(Duration::from_secs(10)).await;
                } else {
                    stream.write_all(body.as_bytes()).await.unwrap();
                }
            });
        }
    });
    format!("http://{}/v1beta", addr)
}

#[tokio::test]
async fn stalled_body_is_retried() {
    let connections = Arc::new(AtomicUsize::new(0));
    let base = spawn_stalling_server(connections.clone()).await;

    let cfg = GenerationConfig {
        timeout_secs: 1,
        max_retries: 1,
        ..config(base)
    };
    let gen = GeminiGenerator::with_api_key(&cfg, "k").unwrap();
    assert_eq!(gen.generate("hi").await.unwrap(), "Second try.");
    assert_eq!(connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stalled_body_times_out_without_retries() {
    let connections = Arc::new(AtomicUsize::new(0));
    let base = spawn_stalling_server(connections).await;

    let cfg = GenerationConfig {
        timeout_secs: 1,
        max_retries: 0,
        ..config(base)
    };
    let gen = GeminiGenerator::with_api_key(&cfg, "k").unwrap();
    let err = gen.generate("hi").await.unwrap_err();
    assert!(err.downcast_ref::<TimedOut>().is_some(), "{:#}", err);
}
