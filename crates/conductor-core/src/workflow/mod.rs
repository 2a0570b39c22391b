//! Workflow engine - caller-declared step graphs of agent + tool calls.
//!
//! # Architecture
//!
//! ```text
//! workflow.yaml / .json ──► WorkflowConfig ──► WorkflowEngine
//!                                                  │
//!                              AgentRegistry ◄─────┤ (agent + permission)
//!                                                  │
//!                                ToolManager ◄─────┤ (tool call, timeout)
//!                                                  │
//!                            EventDispatcher ◄─────┘ (alerts, run log)
//! ```

pub mod condition;
pub mod executor;
pub mod schema;

pub use executor::{
    ExecuteWorkflowRequest, StepStatus, WorkflowEngine, WorkflowRunLog, WorkflowRunResult,
};
pub use schema::{StepNext, StepParams, WorkflowConfig, WorkflowStep};
