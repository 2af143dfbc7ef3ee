//! HTTP surface of the proxy.

mod actions;
mod files;
mod memory;
mod metrics;
mod project;
mod routes;
mod tasks;
mod types;

pub use routes::{serve, AppState};
