//! Interactive terminal shell (`docqa chat`).
//!
//! Mirrors the upload / Submit & Process / Ask workflow line by line:
//!
//! ```text
//! > /upload report.pdf appendix.pdf
//! > /process
//! > What does the report conclude?
//! Bot: ...
//! ```
//!
//! Staged uploads survive a `/process` so the same files can be processed
//! again; `/clear` unstages them.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::DocQaError;
use crate::models::UploadedPdf;
use crate::pipeline::Pipeline;
use crate::session::SessionState;

const HELP: &str = "\
Commands:
  /upload <file.pdf>...  stage PDF files
  /uploads               list staged files
  /clear                 unstage all files
  /process               Submit & Process the staged files
  /history               show the chat transcript
  /sources               show the chunks behind the last answer
  /reset                 drop the session and clear the transcript
  /help                  show this help
  /quit                  exit
Anything else is asked as a question.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(Vec<PathBuf>),
    Uploads,
    Clear,
    Process,
    History,
    Sources,
    Reset,
    Help,
    Quit,
    Ask(String),
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::Ask(line.to_string()));
    }

    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or_default();
    let args: Vec<PathBuf> = parts.map(PathBuf::from).collect();
    Some(match cmd {
        "/upload" => Command::Upload(args),
        "/uploads" => Command::Uploads,
        "/clear" => Command::Clear,
        "/process" | "/submit" => Command::Process,
        "/history" => Command::History,
        "/sources" => Command::Sources,
        "/reset" => Command::Reset,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Help,
    })
}

/// What to print after a command, and whether to stop.
#[derive(Debug)]
pub struct Reply {
    pub text: String,
    pub quit: bool,
}

impl Reply {
    fn say(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quit: false,
        }
    }
}

/// Read a file from disk as an upload. Only PDFs are accepted.
pub fn load_upload(path: &Path) -> Result<UploadedPdf, String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let bytes =
        std::fs::read(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let pdf = UploadedPdf::new(name, bytes);
    let has_pdf_ext = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !has_pdf_ext && !pdf.looks_like_pdf() {
        return Err(DocQaError::NotAPdf(pdf.name).to_string());
    }
    Ok(pdf)
}

pub struct Shell {
    pipeline: Pipeline,
    state: SessionState,
    staged: Vec<UploadedPdf>,
}

impl Shell {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            state: SessionState::new(),
            staged: Vec::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn staged(&self) -> &[UploadedPdf] {
        &self.staged
    }

    pub async fn execute(&mut self, command: Command) -> Reply {
        match command {
            Command::Upload(paths) => Reply::say(self.upload(&paths)),
            Command::Uploads => {
                if self.staged.is_empty() {
                    Reply::say("No files staged.")
                } else {
                    let lines: Vec<String> = self
                        .staged
                        .iter()
                        .map(|f| format!("  {} ({} bytes)", f.name, f.bytes.len()))
                        .collect();
                    Reply::say(lines.join("\n"))
                }
            }
            Command::Clear => {
                let n = self.staged.len();
                self.staged.clear();
                Reply::say(format!("Unstaged {} file(s).", n))
            }
            Command::Process => Reply::say(self.process().await),
            Command::History => Reply::say(self.state.render_transcript()),
            Command::Sources => Reply::say(self.sources()),
            Command::Reset => {
                self.state.reset();
                Reply::say("Session cleared.")
            }
            Command::Help => Reply::say(HELP),
            Command::Quit => Reply {
                text: String::new(),
                quit: true,
            },
            Command::Ask(question) => Reply::say(self.ask(&question).await),
        }
    }

    fn upload(&mut self, paths: &[PathBuf]) -> String {
        if paths.is_empty() {
            return "Usage: /upload <file.pdf>...".to_string();
        }
        let mut lines = Vec::new();
        for path in paths {
            match load_upload(path) {
                Ok(pdf) => {
                    lines.push(format!("Staged {}", pdf.name));
                    self.staged.push(pdf);
                }
                Err(msg) => lines.push(format!("Error: {}", msg)),
            }
        }
        lines.join("\n")
    }

    async fn process(&mut self) -> String {
        let docs = self.staged.clone();
        match self.state.submit_and_process(docs, &self.pipeline).await {
            Ok(summary) => {
                let mut msg = format!(
                    "Processing done, you can ask questions now! ({} chunks from {} document(s))",
                    summary.chunks, summary.documents
                );
                if !summary.skipped.is_empty() {
                    msg.push_str(&format!("\nSkipped unreadable: {}", summary.skipped.join(", ")));
                }
                msg
            }
            Err(e @ DocQaError::NoDocuments) => format!("Warning: {}", e),
            Err(e) => {
                tracing::warn!(error = %e, "process failed");
                format!("Error: {}", e.user_message())
            }
        }
    }

    async fn ask(&mut self, question: &str) -> String {
        match self.state.ask(question).await {
            Ok(output) => format!("Bot: {}", output.answer),
            Err(e) => format!("Error: {}", e.user_message()),
        }
    }

    fn sources(&self) -> String {
        match self.state.last_output() {
            None => "No answer yet.".to_string(),
            Some(out) => out
                .source_documents
                .iter()
                .map(|s| format!("[#{} score {:.3}]\n{}", s.position, s.score, s.text.trim()))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

/// Run the shell on stdin/stdout until `/quit` or end of input.
///
/// Files in `initial` are staged and processed before the first prompt.
pub async fn run(mut shell: Shell, initial: Vec<PathBuf>) -> Result<()> {
    println!("docqa: ask questions about your PDFs. Type /help for commands.");

    if !initial.is_empty() {
        println!("{}", shell.execute(Command::Upload(initial)).await.text);
        println!("{}", shell.execute(Command::Process).await.text);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(command) = parse_command(&line) else {
            continue;
        };
        let reply = shell.execute(command).await;
        if reply.quit {
            break;
        }
        println!("{}", reply.text);
    }

    Ok(())
}
