use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolResult;

/// A single tool invocation made while executing an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: Value,
    pub result: ToolResult,
}

/// Outcome of one agent's run against one prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentExecutionResult {
    pub agent_id: String,
    pub agent_name: String,
    pub success: bool,
    pub response: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentExecutionResult {
    pub fn failed(agent_id: &str, agent_name: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            agent_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            success: false,
            response: error.clone(),
            tool_calls: Vec::new(),
            execution_time_ms: 0,
            error: Some(error),
        }
    }

    /// Names of the tools that were actually invoked, in call order.
    pub fn tools_used(&self) -> Vec<String> {
        self.tool_calls.iter().map(|c| c.tool_name.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiAgentMetadata {
    pub total_execution_time_ms: u64,
    pub agents_used: Vec<String>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

/// Aggregate of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiAgentResult {
    pub success: bool,
    pub response: String,
    pub agent_results: Vec<AgentExecutionResult>,
    pub metadata: MultiAgentMetadata,
}

impl MultiAgentResult {
    /// Uniform envelope for a run that could not be carried out.
    pub fn failure(response: impl Into<String>, elapsed_ms: u64) -> Self {
        let response = response.into();
        Self {
            success: false,
            metadata: MultiAgentMetadata {
                total_execution_time_ms: elapsed_ms,
                errors: vec![response.clone()],
                ..Default::default()
            },
            response,
            agent_results: Vec::new(),
        }
    }
}
