//! Conductor Core: transport-agnostic agent and tool orchestration.
//!
//! This crate holds the coordination logic and has no HTTP server
//! dependency, so it can sit behind:
//!
//! - the `conductor` CLI
//! - an HTTP or RPC layer owned by the host
//! - tests that wire components by hand
//!
//! # Components
//!
//! - `catalog`: agent registry and tool permissions
//! - `tools`: tool registry, execution and usage statistics
//! - `agent_handler`: one agent against one prompt
//! - `orchestration` / `pipeline`: routing and multi-agent fan-out
//! - `workflow`: step graphs with retries, timeouts and branches
//! - `queue`: in-memory retry queue with a dead-letter store
//! - `events`: fire-and-forget alerts, webhooks and analytics

pub mod agent_handler;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod intent;
pub mod models;
pub mod orchestration;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod state;
pub mod tools;
pub mod workflow;

// Convenience re-exports
pub use config::ConductorConfig;
pub use error::ConductorError;
pub use state::{AppState, AppStateInner};

/// Truncate to at most `max` characters, marking the cut with an ellipsis.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
