//! Submit & Process progress reporting.
//!
//! Processing blocks the shell until the new session is ready, so progress
//! is reported per stage while it runs. Output goes to **stderr** so stdout
//! stays reserved for answers.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Reading PDF text.
    Extracting { documents: usize },
    /// Splitting extracted text.
    Chunking { characters: usize },
    /// Embedding chunks and building the index. May include a model load.
    Embedding { chunks: usize },
    /// The new session replaced the previous one.
    Ready { chunks: usize },
}

/// Receives progress events from the pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly lines on stderr: "processing  embedding 1,234 chunks...".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Extracting { documents } => {
                format!("processing  reading {} pdf(s)...\n", format_number(*documents))
            }
            ProgressEvent::Chunking { characters } => format!(
                "processing  splitting {} characters...\n",
                format_number(*characters)
            ),
            ProgressEvent::Embedding { chunks } => {
                format!("processing  embedding {} chunks...\n", format_number(*chunks))
            }
            ProgressEvent::Ready { chunks } => format!(
                "processing  done, {} chunks indexed. You can ask questions now!\n",
                format_number(*chunks)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Extracting { documents } => serde_json::json!({
                "event": "progress",
                "phase": "extracting",
                "documents": documents
            }),
            ProgressEvent::Chunking { characters } => serde_json::json!({
                "event": "progress",
                "phase": "chunking",
                "characters": characters
            }),
            ProgressEvent::Embedding { chunks } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "chunks": chunks
            }),
            ProgressEvent::Ready { chunks } => serde_json::json!({
                "event": "progress",
                "phase": "ready",
                "chunks": chunks
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value; `None` for unknown names.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
