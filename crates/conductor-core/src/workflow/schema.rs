//! Workflow graph definitions.
//!
//! A workflow is a caller-declared graph of steps, each bound to one
//! agent + tool invocation:
//!
//! ```yaml
//! name: "Quarterly review"
//! start: load
//! steps:
//!   - id: load
//!     agent_id: data-analyst
//!     name: "Load metrics"
//!     retries: 1
//!     params:
//!       toolName: analyzeData
//!       toolArgs:
//!         sourceId: q3-metrics
//!     next: [assess, notify-failure]   # success, failure
//!
//!   - id: assess
//!     agent_id: financial-analyst
//!     name: "Assess investment"
//!     condition: "step_load.rowCount"
//!     params:
//!       toolName: calculateFinancials
//!       toolArgs:
//!         cashFlows: [400, 400, 400]
//!         initialInvestment: 1000
//!
//!   - id: notify-failure
//!     agent_id: general-assistant
//!     name: "Draft incident note"
//!     params:
//!       toolName: draftEmail
//!       toolArgs:
//!         prompt: "Metrics load failed"
//! ```
//!
//! `next` is either a single id (followed on success) or an ordered list
//! where the first entry is the success branch and the second the failure
//! branch. A step without `next` ends the run.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConductorError;

/// Top-level workflow definition supplied by the caller for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub name: Option<String>,

    /// Entry step. Defaults to the first declared step.
    #[serde(default)]
    pub start: Option<String>,

    pub steps: Vec<WorkflowStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,

    #[serde(alias = "agentId")]
    pub agent_id: String,

    #[serde(default)]
    pub name: String,

    /// Free-form step kind, carried into the run log only.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<StepNext>,

    /// Guard evaluated against the running context; see `condition`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Extra attempts after the first failure.
    #[serde(default)]
    pub retries: u32,

    #[serde(default)]
    pub params: StepParams,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Merged over the running context; these win on key clashes.
    #[serde(default)]
    pub tool_args: Map<String, Value>,

    /// Per-step timeout override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepNext {
    One(String),
    Many(Vec<String>),
}

impl StepNext {
    pub fn on_success(&self) -> Option<&str> {
        match self {
            StepNext::One(id) => Some(id.as_str()),
            StepNext::Many(ids) => ids.first().map(String::as_str),
        }
    }

    pub fn on_failure(&self) -> Option<&str> {
        match self {
            StepNext::One(_) => None,
            StepNext::Many(ids) => ids.get(1).map(String::as_str),
        }
    }

    fn targets(&self) -> Vec<&str> {
        match self {
            StepNext::One(id) => vec![id.as_str()],
            StepNext::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

impl WorkflowConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConductorError> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConductorError::BadRequest(format!("Failed to parse workflow YAML: {}", e))
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConductorError> {
        serde_json::from_str(json).map_err(|e| {
            ConductorError::BadRequest(format!("Failed to parse workflow JSON: {}", e))
        })
    }

    /// Load by extension: `.json` as JSON, anything else as YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConductorError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConductorError::BadRequest(format!(
                "Failed to read workflow file '{}': {}",
                path.display(),
                e
            ))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn first_step_id(&self) -> Option<&str> {
        self.start
            .as_deref()
            .or_else(|| self.steps.first().map(|s| s.id.as_str()))
    }

    /// Structural problems that make the graph unrunnable, one message each.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.steps.is_empty() {
            problems.push("Workflow has no steps".to_string());
            return problems;
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.is_empty() {
                problems.push("Step with an empty id".to_string());
            } else if !seen.insert(step.id.as_str()) {
                problems.push(format!("Duplicate step id '{}'", step.id));
            }
        }

        if let Some(start) = &self.start {
            if !seen.contains(start.as_str()) {
                problems.push(format!("Start step '{}' does not exist", start));
            }
        }

        for step in &self.steps {
            if let Some(next) = &step.next {
                for target in next.targets() {
                    if !seen.contains(target) {
                        problems.push(format!(
                            "Step '{}' points to unknown step '{}'",
                            step.id, target
                        ));
                    }
                }
            }
        }

        problems
    }
}
