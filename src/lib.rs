//! Conversational memory for on-device AI assistants — recall without leaving the machine.
//!
//! Engram stores every conversational turn, indexes it for semantic recall, and merges
//! it with curated personal-knowledge documents into a bounded, ranked, annotated
//! context bundle handed to the model on each turn. Three retrieval sources feed the
//! bundle, each behind the same plugin capability:
//!
//! | Source | Kind | Signal |
//! |--------|------|--------|
//! | **Identity** | curated "about me" documents | authoritative, always relevant |
//! | **Vault** | user-owned markdown note tree | lexical keyword relevance |
//! | **Memory** | past conversation turns | embedding cosine similarity |
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec) for
//!   vector search, plus a crash-safe JSON-backed ring buffer of recent turns
//! - **Embeddings**: Local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions)
//! - **Assembly**: concurrent failure-isolated plugin fan-out, relevance-ranked merge,
//!   conflict detection, character-budget truncation, uncertainty annotation
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite database initialization, schema, and dimension checks
//! - [`embedding`] — Text-to-vector embedding pipeline via ONNX Runtime
//! - [`memory`] — Turn types and the stores: buffer, vector, identity, vault
//! - [`context`] — Plugin capabilities, retrieval/storage orchestrators, rendering
//! - [`engine`] — The per-turn pipeline tying storage and retrieval together

pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod memory;
