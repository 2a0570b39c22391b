//! Core error type for the Conductor platform.
//!
//! `ConductorError` is used by the plumbing layers (config loading, providers,
//! tool executors). Component boundaries such as the tool manager, agent
//! handler and workflow engine convert it into result structs instead of
//! propagating it upward.

#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ConductorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ConductorError::Timeout(e.to_string())
        } else {
            ConductorError::Provider(e.to_string())
        }
    }
}
