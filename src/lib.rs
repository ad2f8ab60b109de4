//! # docqa
//!
//! Ask questions about PDF documents. Uploaded PDFs are reduced to text,
//! split into overlapping chunks, embedded with a local model and held in
//! an in-memory vector index. Each question retrieves the closest chunks
//! and hands them, with the conversation so far, to a hosted LLM.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌─────────────┐
//! │ PDF bytes│──▶│ extract  │──▶│  chunk    │──▶│ VectorIndex │
//! └──────────┘   └──────────┘   └───────────┘   └──────┬──────┘
//!                                                      │
//!   question ──▶ ConversationalSession ◀───────────────┘
//!                 (condense → retrieve → prompt → Gemini)
//!                        │
//!                        ▼
//!                 SessionState transcript ──▶ CLI shell / HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | User-facing error taxonomy |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory exact nearest-neighbor index |
//! | [`generation`] | Hosted LLM client |
//! | [`conversation`] | Retrieval + memory + generation chain |
//! | [`pipeline`] | Submit & Process |
//! | [`session`] | Session state and guards |
//! | [`progress`] | Processing progress reporting |
//! | [`repl`] | Interactive terminal shell |
//! | [`server`] | HTTP JSON API |

pub mod chunk;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod repl;
pub mod server;
pub mod session;
