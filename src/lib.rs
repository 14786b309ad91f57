//! Long-term memory for AI agents over MCP.
//!
//! `memory-mcp` is an [MCP](https://modelcontextprotocol.io/) server that keeps
//! a scoped collection of short factual memories. Callers add text or whole
//! conversations; a language model distils them into facts, which are embedded
//! and merged with near-identical memories already stored for the same scope.
//!
//! | Tool | Does |
//! |------|------|
//! | `add_memory` | extract, merge and store facts from text or messages |
//! | `search_memories` | semantic search, paginated |
//! | `get_memories` | list by scope and filters, newest first, paginated |
//! | `get_memory` / `update_memory` / `delete_memory` | single-record access |
//! | `delete_all_memories` | delete by scope or filters (one is required) |
//! | `get_memory_history` | earlier versions of a memory |
//! | `reset_memories` | clear everything |
//!
//! Every memory belongs to a scope made of up to three identifiers,
//! `user_id`, `agent_id` and `run_id`.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   cosine distance, exclusively locked by one process
//! - **Embeddings**: local ONNX all-MiniLM-L6-v2, OpenAI, Ollama, or offline hashing
//! - **Extraction**: OpenAI, OpenRouter or Ollama chat models, or passthrough
//! - **Transport**: MCP over stdio or streamable HTTP
//!
//! # Modules
//!
//! - [`engine`]: the add/search/list/get/update/delete/history/reset operations
//! - [`tools`]: MCP tool router, argument validation and error envelopes
//! - [`filter`], [`scope`], [`pagination`], [`prompt`]: request semantics
//! - [`memory`]: the SQLite store behind the [`memory::MemoryStore`] trait
//! - [`embedding`], [`extraction`]: provider traits and registries
//! - [`config`], [`db`], [`error`], [`http`], [`server`]: plumbing

pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod filter;
pub mod http;
pub mod memory;
pub mod pagination;
pub mod prompt;
pub mod scope;
pub mod server;
pub mod tools;
