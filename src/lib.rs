//! # Review Harness
//!
//! A local-first harness for asking model agents about your own code and
//! documentation, and for generating test and emulation code from it.
//!
//! Each front-end is a **page**: an upload surface (code and/or docs), a
//! knowledge base built from the uploads, and a set of tabs that route a
//! query to an agent. Agents are plain responders or orchestrators that
//! hand tasks to team members.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ ArtifactStore│──▶│KnowledgeSource│──▶│ VectorIndex  │
//! │ code / doc   │   │extract+chunk │   │ SQLite       │
//! └──────────────┘   │ +embed       │   └──────┬───────┘
//!                    └──────────────┘          │
//!                                              ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ CLI / HTTP   │──▶│PageController│──▶│ Responder /  │──▶ Ollama
//! │ (rh)         │   │ + Session    │   │ Orchestrator │    /api/chat
//! └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and validation |
//! | [`error`] | Error taxonomy surfaced to front-ends |
//! | [`artifacts`] | Uploaded files, first write wins |
//! | [`extract`] | Text extraction (PDF and plain text) |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`db`], [`migrate`], [`sqlite_index`] | SQLite-backed vector index |
//! | [`knowledge`] | Ingestion, combined retrieval, reset |
//! | [`llm`] | Model endpoint client |
//! | [`tools`] | Built-in tools offered to agents |
//! | [`responder`], [`orchestrator`] | Agents |
//! | [`session`] | Per-session history |
//! | [`controller`] | Page request flow |
//! | [`server`] | HTTP front-end |

pub mod artifacts;
pub mod config;
pub mod controller;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod knowledge;
pub mod llm;
pub mod migrate;
pub mod orchestrator;
pub mod responder;
pub mod server;
pub mod session;
pub mod sqlite_index;
pub mod tools;

pub use error::{Error, Result};
