//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the conductor-core components through `AppState`.

pub mod agent;
pub mod prompt;
pub mod route;
pub mod tool;
pub mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use conductor_core::models::AgentContext;
use conductor_core::state::AppState;
use conductor_core::{AppStateInner, ConductorConfig};
use serde_json::Value;

/// Load configuration and wire a shared `AppState`.
///
/// `--data-dir` overrides the configured `data_dir`.
pub fn init_state(config_path: Option<&str>, data_dir: Option<&str>) -> Result<AppState, String> {
    let mut config = ConductorConfig::load(config_path).map_err(|e| e.to_string())?;
    if let Some(dir) = data_dir {
        config.data_dir = Some(PathBuf::from(dir));
    }
    let state = AppStateInner::new(config).map_err(|e| format!("Failed to initialize: {}", e))?;
    tracing::debug!(
        "[CLI] State ready: {} agent(s), {} tool(s)",
        state.agent_registry.get_all_agents().len(),
        state.tool_manager.get_tool_info().len()
    );
    Ok(Arc::new(state))
}

/// Build the request context from `--user-id` and `--param key=value` pairs.
pub fn build_context(user_id: &str, params: &[String]) -> Result<AgentContext, String> {
    let mut context = AgentContext::new(user_id);
    for raw in params {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| format!("Invalid --param '{}', expected key=value", raw))?;
        let value = serde_json::from_str::<Value>(value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        context = context.with_parameter(key.trim(), value);
    }
    Ok(context)
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Serialize anything and pretty-print it.
pub fn print_serialized<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let value = serde_json::to_value(value).map_err(|e| e.to_string())?;
    print_json(&value);
    Ok(())
}
