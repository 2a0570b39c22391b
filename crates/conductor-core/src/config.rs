//! Runtime configuration.
//!
//! ```yaml
//! orchestrator:
//!   default_strategy: keyword
//!   generalist_agent_id: general-assistant
//! workflow:
//!   step_timeout_secs: 30
//!   max_steps: 64
//! queue:
//!   poll_interval_ms: 2000
//!   worker_enabled: true
//! events:
//!   channel_capacity: 256
//!   webhook_url: "${CONDUCTOR_WEBHOOK_URL:-}"
//! llm:
//!   api_key: "${ANTHROPIC_API_KEY}"
//!   model: claude-sonnet-4-20250514
//! agents_dir: ./agents
//! ```
//!
//! Every section is optional. `${VAR}` and `${VAR:-default}` references are
//! expanded before parsing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::GENERALIST_AGENT_ID;
use crate::error::ConductorError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    pub orchestrator: OrchestratorSettings,
    pub workflow: WorkflowSettings,
    pub queue: QueueSettings,
    pub events: EventSettings,
    pub llm: Option<LlmSettings>,
    /// Extra agent definitions (`*.yaml`) merged over the seed catalog.
    pub agents_dir: Option<PathBuf>,
    /// Documents and data sources for the in-memory document source.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub default_strategy: String,
    pub generalist_agent_id: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_strategy: "keyword".to_string(),
            generalist_agent_id: GENERALIST_AGENT_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub step_timeout_secs: u64,
    pub max_steps: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            step_timeout_secs: 30,
            max_steps: 64,
        }
    }
}

impl WorkflowSettings {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub poll_interval_ms: u64,
    /// Start the background drain when the state is wired.
    pub worker_enabled: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            worker_enabled: true,
        }
    }
}

impl QueueSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub channel_capacity: usize,
    pub webhook_url: Option<String>,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            webhook_url: None,
        }
    }
}

/// Anthropic-compatible Messages API endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: String::new(),
            model: "claude-sonnet-4-20250514".to_string(),
            timeout_secs: 120,
            max_tokens: 4096,
        }
    }
}

impl ConductorConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConductorError> {
        let expanded = resolve_env_vars(yaml);
        if expanded.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&expanded)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConductorError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConductorError::BadRequest(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Explicit path, then `./conductor.yaml`, then the user config dir,
    /// else built-in defaults. An explicit path that cannot be read is an error.
    pub fn load(explicit: Option<&str>) -> Result<Self, ConductorError> {
        if let Some(path) = explicit {
            tracing::info!("[Config] Loading {}", path);
            return Self::from_file(Path::new(path));
        }

        for candidate in default_locations() {
            if candidate.is_file() {
                tracing::info!("[Config] Loading {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }

        tracing::debug!("[Config] No config file found, using defaults");
        Ok(Self::default())
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("conductor.yaml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("conductor").join("config.yaml"));
    }
    paths
}

/// Resolve environment variable references in a string.
/// Supports `${ENV_VAR}` and `${ENV_VAR:-default}` syntax. Unset variables
/// without a default are left as written.
pub fn resolve_env_vars(input: &str) -> String {
    let re = match Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let var_expr = &caps[1];
        if let Some(idx) = var_expr.find(":-") {
            let var_name = &var_expr[..idx];
            let default_val = &var_expr[idx + 2..];
            std::env::var(var_name).unwrap_or_else(|_| default_val.to_string())
        } else {
            std::env::var(var_expr).unwrap_or_else(|_| format!("${{{}}}", var_expr))
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ConductorConfig::from_yaml("").unwrap();
        assert_eq!(config.orchestrator.default_strategy, "keyword");
        assert_eq!(config.orchestrator.generalist_agent_id, "general-assistant");
        assert_eq!(config.workflow.step_timeout(), Duration::from_secs(30));
        assert_eq!(config.workflow.max_steps, 64);
        assert_eq!(config.queue.poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.events.channel_capacity, 256);
        assert!(config.llm.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let yaml = r#"
workflow:
  max_steps: 8
llm:
  api_key: "k"
"#;
        let config = ConductorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.workflow.max_steps, 8);
        assert_eq!(config.workflow.step_timeout_secs, 30);
        let llm = config.llm.unwrap();
        assert_eq!(llm.api_key, "k");
        assert_eq!(llm.base_url, "https://api.anthropic.com");
    }

    #[test]
    fn env_references_are_expanded() {
        std::env::set_var("CONDUCTOR_TEST_WEBHOOK", "http://hooks.local/a");
        let yaml = r#"
events:
  webhook_url: "${CONDUCTOR_TEST_WEBHOOK}"
orchestrator:
  default_strategy: "${CONDUCTOR_TEST_UNSET_STRATEGY:-multi-agent}"
"#;
        let config = ConductorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.events.webhook_url.as_deref(), Some("http://hooks.local/a"));
        assert_eq!(config.orchestrator.default_strategy, "multi-agent");
        std::env::remove_var("CONDUCTOR_TEST_WEBHOOK");

        assert_eq!(resolve_env_vars("${CONDUCTOR_TEST_NOPE}"), "${CONDUCTOR_TEST_NOPE}");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ConductorConfig::load(Some("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conductor.yaml");
        std::fs::write(&path, "queue:\n  poll_interval_ms: 50\n").unwrap();
        let config = ConductorConfig::from_file(&path).unwrap();
        assert_eq!(config.queue.poll_interval_ms, 50);
    }
}
