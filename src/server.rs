//! HTTP JSON API over one process-wide session.
//!
//! All actions go through a single [`SessionState`] behind a
//! `tokio::sync::Mutex`, so actions run one at a time in arrival order,
//! just like the interactive shell.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/process` | Submit & Process a batch of base64-encoded PDFs |
//! | `POST` | `/ask` | Ask a question of the current session |
//! | `GET`  | `/transcript` | Chat transcript and readiness |
//! | `POST` | `/reset` | Drop the session and clear the transcript |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_session", "message": "Please upload PDFs and click Submit & Process first." } }
//! ```
//!
//! Error codes: `bad_request` (400), `no_session` (409), `processing_failed` (422),
//! `generation_failed` (502), `timeout` (504).

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{DocQaError, ErrorKind};
use crate::models::{ChainOutput, ProcessSummary, TranscriptEntry, UploadedPdf};
use crate::pipeline::Pipeline;
use crate::session::SessionState;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    session: Arc<Mutex<SessionState>>,
}

/// Build the router with a fresh, uninitialized session.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let state = AppState {
        pipeline,
        session: Arc::new(Mutex::new(SessionState::new())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/process", post(handle_process))
        .route("/ask", post(handle_ask))
        .route("/transcript", get(handle_transcript))
        .route("/reset", post(handle_reset))
        .route("/health", get(handle_health))
        // Uploads have no size limit at this layer.
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .with_state(state)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(pipeline: Pipeline) -> anyhow::Result<()> {
    let bind_addr = pipeline.config().server.bind.clone();
    let app = router(Arc::new(pipeline));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "docqa server listening");
    println!("docqa server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<DocQaError> for AppError {
    fn from(err: DocQaError) -> Self {
        let (status, code) = match (&err, err.kind()) {
            (DocQaError::NoSession, _) => (StatusCode::CONFLICT, "no_session"),
            (DocQaError::Timeout(_), _) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            (_, ErrorKind::Input) => (StatusCode::BAD_REQUEST, "bad_request"),
            (_, ErrorKind::Build) => (StatusCode::UNPROCESSABLE_ENTITY, "processing_failed"),
            (_, ErrorKind::Generation) => (StatusCode::BAD_GATEWAY, "generation_failed"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /process ============

#[derive(Deserialize)]
struct ProcessRequest {
    #[serde(default)]
    files: Vec<UploadFile>,
}

#[derive(Deserialize)]
struct UploadFile {
    name: String,
    content_base64: String,
}

/// Decode uploads. Rejects bad base64 and non-PDF content up front.
fn decode_uploads(files: Vec<UploadFile>) -> Result<Vec<UploadedPdf>, AppError> {
    files
        .into_iter()
        .map(|f| {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(f.content_base64.trim())
                .map_err(|e| bad_request(format!("{}: invalid base64: {}", f.name, e)))?;
            let pdf = UploadedPdf::new(f.name, bytes);
            if !pdf.looks_like_pdf() {
                return Err(DocQaError::NotAPdf(pdf.name).into());
            }
            Ok(pdf)
        })
        .collect()
}

async fn handle_process(
    State(state): State<AppState>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessSummary>, AppError> {
    let docs = decode_uploads(req.files)?;
    let mut session = state.session.lock().await;
    let summary = session
        .submit_and_process(docs, &state.pipeline)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "process failed");
            AppError::from(e)
        })?;
    Ok(Json(summary))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<ChainOutput>, AppError> {
    let mut session = state.session.lock().await;
    let output = session.ask(&req.question).await.map_err(|e| {
        tracing::warn!(error = %e, "ask failed");
        AppError::from(e)
    })?;
    Ok(Json(output.clone()))
}

// ============ GET /transcript ============

#[derive(Serialize)]
struct TranscriptResponse {
    ready: bool,
    entries: Vec<TranscriptEntry>,
}

async fn handle_transcript(State(state): State<AppState>) -> Json<TranscriptResponse> {
    let session = state.session.lock().await;
    Json(TranscriptResponse {
        ready: session.is_ready(),
        entries: session.transcript().to_vec(),
    })
}

// ============ POST /reset ============

async fn handle_reset(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.session.lock().await.reset();
    Json(serde_json::json!({ "status": "ok" }))
}
