//! Integration tests for the conductor CLI.
//!
//! These tests exercise the same state and boundary operations as the
//! binary, wired with the default configuration and an in-memory event sink.

use std::sync::Arc;

use async_trait::async_trait;
use conductor_core::events::{EventSink, MemorySink};
use conductor_core::models::AgentContext;
use conductor_core::queue::{Job, JobProcessor, ProcessOutcome};
use conductor_core::state::{AppState, AppStateInner};
use conductor_core::workflow::{ExecuteWorkflowRequest, StepStatus, WorkflowConfig};
use conductor_core::{ConductorConfig, ConductorError};
use serde_json::json;

fn test_state_with(config: ConductorConfig) -> (AppState, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let sinks: Vec<Arc<dyn EventSink>> = vec![sink.clone()];
    let state = AppStateInner::with_sinks(config, sinks).expect("Failed to build state");
    (Arc::new(state), sink)
}

fn test_state() -> (AppState, Arc<MemorySink>) {
    test_state_with(ConductorConfig::default())
}

struct AlwaysFails;

#[async_trait]
impl JobProcessor for AlwaysFails {
    async fn process(&self, _job: &Job) -> Result<bool, ConductorError> {
        Ok(false)
    }
}

#[tokio::test]
async fn test_unknown_tool_returns_error_result() {
    let (state, _) = test_state();
    let result = state.tool_manager.execute_tool("noSuchTool", json!({})).await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Tool 'noSuchTool' not found"));
    assert!(state.tool_manager.get_usage_stats().is_empty());
}

#[tokio::test]
async fn test_financial_analyst_runs_calculations() {
    let (state, _) = test_state();
    let ctx = AgentContext::new("u1")
        .with_parameter("cashFlows", json!([400, 400, 400]))
        .with_parameter("initialInvestment", json!(1000));

    let result = state
        .execute_agent(
            "financial-analyst",
            "What is the NPV and payback of this investment?",
            &ctx,
        )
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.tools_used(), vec!["calculateFinancials"]);
    let data = result.tool_calls[0].result.data.as_ref().unwrap();
    assert_eq!(data["totalInflow"], json!(1200.0));
    assert!(result.response.starts_with("Successful operations:"));
}

#[tokio::test]
async fn test_agent_cannot_use_tools_outside_its_allow_list() {
    let (state, _) = test_state();
    assert!(state
        .agent_registry
        .can_agent_use_tool("financial-analyst", "calculateFinancials"));
    assert!(!state
        .agent_registry
        .can_agent_use_tool("hr-specialist", "calculateFinancials"));

    let ctx = AgentContext::new("u1").with_parameter("cashFlows", json!([1, 2]));
    let result = state
        .execute_agent("hr-specialist", "compute the npv", &ctx)
        .await;
    assert!(!result.success);
    assert!(result.tool_calls.is_empty());
    assert!(result
        .response
        .contains("Agent 'hr-specialist' is not permitted to use tool 'calculateFinancials'"));
}

#[tokio::test]
async fn test_process_request_routes_financial_prompts() {
    let (state, sink) = test_state();
    let result = state
        .process_request("Analyze our financial investment", &AgentContext::new("u1"))
        .await;
    assert!(result
        .metadata
        .agents_used
        .contains(&"financial-analyst".to_string()));
    assert_eq!(result.metadata.strategy.as_deref(), Some("keyword"));

    state.events.flush().await;
    assert!(sink
        .events()
        .iter()
        .any(|e| e.event_type == "multi_agent_request"));
}

#[tokio::test]
async fn test_multi_agent_request_includes_generalist_first() {
    let (state, _) = test_state();
    let result = state
        .process_multi_agent_request("Plan hiring within the budget", &AgentContext::new("u1"))
        .await;

    let used = &result.metadata.agents_used;
    assert_eq!(used[0], "general-assistant");
    assert!(used.contains(&"financial-analyst".to_string()));
    assert!(used.contains(&"hr-specialist".to_string()));
    assert_eq!(result.agent_results.len(), used.len());
}

#[tokio::test]
async fn test_summarize_document_from_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("memo.txt"),
        "Revenue grew in Q3. Costs were flat. Hiring resumes in Q4.",
    )
    .unwrap();

    let mut config = ConductorConfig::default();
    config.data_dir = Some(dir.path().to_path_buf());
    let (state, _) = test_state_with(config);

    let ctx = AgentContext::new("u1").with_parameter("fileId", json!("memo"));
    let result = state
        .execute_agent("general-assistant", "Summarize the memo", &ctx)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.tools_used(), vec!["summarizeDoc"]);
    assert!(result.response.contains("Revenue grew in Q3."));
}

#[tokio::test]
async fn test_workflow_file_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("review.yaml");
    std::fs::write(
        &path,
        r#"
name: Investment review
steps:
  - id: calc
    agent_id: financial-analyst
    params:
      toolName: calculateFinancials
      toolArgs:
        cashFlows: [400, 400, 400]
        initialInvestment: 1000
    next: notify
  - id: notify
    agent_id: general-assistant
    condition: "step_calc.totalInflow == 1200"
    params:
      toolName: draftEmail
      toolArgs:
        prompt: "Share the investment review"
"#,
    )
    .unwrap();

    let (state, sink) = test_state();
    let workflow = WorkflowConfig::from_file(&path).unwrap();
    assert!(state.validate_workflow(&workflow).is_empty());

    let result = state
        .execute_workflow(ExecuteWorkflowRequest {
            workflow_config: workflow,
            user_id: "u1".to_string(),
            workflow_id: "review".to_string(),
        })
        .await;

    assert!(result.success, "{:?}", result.error);
    let statuses: Vec<StepStatus> = result.logs.iter().map(|l| l.status).collect();
    assert_eq!(statuses, vec![StepStatus::Success, StepStatus::Success]);
    assert_eq!(result.final_context["step_calc"]["totalInflow"], json!(1200.0));
    assert!(result.final_context.get("step_notify").is_some());

    state.events.flush().await;
    assert!(sink.alerts().iter().any(|a| a.alert_type == "workflow_success"));
}

#[tokio::test]
async fn test_dead_letter_scenario() {
    // Drive the queue by hand instead of through the background worker.
    let mut config = ConductorConfig::default();
    config.queue.worker_enabled = false;
    let (state, _) = test_state_with(config);
    state
        .retry_queue
        .register_processor("x", Arc::new(AlwaysFails));

    state.add_job(Job::new("j1", "x", json!({}), 2));
    assert_eq!(
        state.retry_queue.process_next().await,
        ProcessOutcome::Requeued("j1".to_string())
    );
    assert_eq!(
        state.retry_queue.process_next().await,
        ProcessOutcome::DeadLettered("j1".to_string())
    );

    let dead = state.get_dead_letter_jobs();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, "j1");
    assert!(state.retry_queue.pending_jobs().is_empty());

    assert!(state.remove_dead_letter_job("j1"));
    assert!(state.get_dead_letter_jobs().is_empty());
}

#[test]
fn test_config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conductor.yaml");
    std::fs::write(
        &path,
        "orchestrator:\n  default_strategy: multi-agent\nworkflow:\n  step_timeout_secs: 5\n",
    )
    .unwrap();

    let config = ConductorConfig::load(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(config.orchestrator.default_strategy, "multi-agent");
    assert_eq!(config.workflow.step_timeout_secs, 5);
    assert_eq!(config.queue.poll_interval_ms, 2000);
    assert!(config.queue.worker_enabled);
}
