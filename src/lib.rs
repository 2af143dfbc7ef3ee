//! GitHub-backed task delivery proxy for LLM-driven agents.
//!
//! The proxy exposes a small HTTP API over a delivery workflow stored
//! as YAML files in a GitHub repository: a task file, a memory index,
//! an append-only changelog, and per-task output files. Every tracked
//! write flows through the commit-and-log routine in [`store`], which
//! keeps the changelog and memory index in sync with the files.

pub mod api;
pub mod config;
pub mod error;
pub mod github;
pub mod llm;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod project;
pub mod store;
pub mod tasks;
