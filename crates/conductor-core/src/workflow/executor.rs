//! Workflow Engine - runs a step graph one step at a time.
//!
//! For the current step the engine:
//! 1. Evaluates the optional `condition` (false → skipped, success branch)
//! 2. Resolves the bound agent and checks it may use `params.toolName`
//! 3. Runs the tool with `context ∪ toolArgs`, racing the step timeout
//! 4. Retries up to `retries` extra times, alerting on every failed attempt
//! 5. Stores the output under `context["step_<id>"]` and follows `next[0]`,
//!    or takes `next[1]` once retries are exhausted
//!
//! A step id never runs twice in one run and `max_steps` bounds the walk.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::catalog::AgentRegistry;
use crate::config::WorkflowSettings;
use crate::events::{EventDispatcher, Severity, SystemAlert};
use crate::tools::{ToolManager, ToolResult};
use crate::workflow::condition;
use crate::workflow::schema::{WorkflowConfig, WorkflowStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Fail,
    Skipped,
}

/// One entry per step attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunLog {
    pub step_id: String,
    pub agent_id: String,
    pub name: String,
    pub status: StepStatus,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failed attempts before this one.
    pub retries: u32,
}

impl WorkflowRunLog {
    fn start(step: &WorkflowStep, input: Value, retries: u32) -> Self {
        Self {
            step_id: step.id.clone(),
            agent_id: step.agent_id.clone(),
            name: step.name.clone(),
            status: StepStatus::Pending,
            input,
            output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            retries,
        }
    }

    fn finish(mut self, status: StepStatus) -> Self {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self
    }

    fn failed(self, error: impl Into<String>) -> Self {
        let mut log = self.finish(StepStatus::Fail);
        log.error = Some(error.into());
        log
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteWorkflowRequest {
    pub workflow_config: WorkflowConfig,
    pub user_id: String,
    pub workflow_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunResult {
    pub run_id: String,
    pub workflow_id: String,
    pub logs: Vec<WorkflowRunLog>,
    pub final_context: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Immutable facts about one run, shared by alerts and the analytics record.
struct RunScope<'a> {
    run_id: &'a str,
    workflow_id: &'a str,
    user_id: &'a str,
}

pub struct WorkflowEngine {
    registry: Arc<AgentRegistry>,
    tools: Arc<ToolManager>,
    events: EventDispatcher,
    step_timeout: Duration,
    max_steps: usize,
}

impl WorkflowEngine {
    pub fn new(
        registry: Arc<AgentRegistry>,
        tools: Arc<ToolManager>,
        events: EventDispatcher,
        settings: &WorkflowSettings,
    ) -> Self {
        Self {
            registry,
            tools,
            events,
            step_timeout: settings.step_timeout(),
            max_steps: settings.max_steps.max(1),
        }
    }

    pub async fn execute_workflow(&self, request: ExecuteWorkflowRequest) -> WorkflowRunResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        let scope = RunScope {
            run_id: &run_id,
            workflow_id: &request.workflow_id,
            user_id: &request.user_id,
        };
        let config = &request.workflow_config;

        tracing::info!(
            "[Workflow] Run {} of '{}' started ({} steps)",
            run_id,
            config.name.as_deref().unwrap_or(&request.workflow_id),
            config.steps.len()
        );

        let mut context = Map::new();
        context.insert("userId".to_string(), json!(request.user_id));
        context.insert("workflowId".to_string(), json!(request.workflow_id));
        context.insert("runId".to_string(), json!(run_id));

        let mut logs = Vec::new();
        let error = match self.walk(config, &scope, &mut context, &mut logs).await {
            Ok(()) => None,
            Err(e) => Some(e),
        };
        let success = error.is_none();

        if success {
            tracing::info!("[Workflow] Run {} completed ({} log entries)", run_id, logs.len());
            self.events.alert(
                SystemAlert::new(
                    "workflow_success",
                    Severity::Low,
                    format!("Workflow '{}' completed", request.workflow_id),
                )
                .with_context(json!({ "runId": run_id, "workflowId": request.workflow_id })),
            );
        } else {
            tracing::warn!(
                "[Workflow] Run {} failed: {}",
                run_id,
                error.as_deref().unwrap_or_default()
            );
        }

        let logs_json = serde_json::to_value(&logs).unwrap_or(Value::Null);
        self.events.analytics(
            &request.user_id,
            "workflow_run",
            json!({
                "runId": run_id,
                "workflowId": request.workflow_id,
                "success": success,
                "error": error,
                "logs": logs_json,
            }),
        );

        WorkflowRunResult {
            run_id,
            workflow_id: request.workflow_id,
            logs,
            final_context: Value::Object(context),
            success,
            error,
        }
    }

    /// Walk the graph from the start step. `Err` carries the reason the run
    /// stopped early.
    async fn walk(
        &self,
        config: &WorkflowConfig,
        scope: &RunScope<'_>,
        context: &mut Map<String, Value>,
        logs: &mut Vec<WorkflowRunLog>,
    ) -> Result<(), String> {
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(format!("Invalid workflow: {}", problems.join("; ")));
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut current = config.first_step_id().map(str::to_string);

        while let Some(step_id) = current.take() {
            if visited.len() >= self.max_steps {
                return Err(format!(
                    "Workflow exceeded the limit of {} steps",
                    self.max_steps
                ));
            }
            if !visited.insert(step_id.clone()) {
                return Err(format!(
                    "Step '{}' was reached a second time; aborting to avoid a cycle",
                    step_id
                ));
            }
            let step = config
                .step(&step_id)
                .ok_or_else(|| format!("Step '{}' not found", step_id))?;
            let branches = step.next.as_ref();

            if let Some(expr) = &step.condition {
                if !condition::evaluate(expr, context) {
                    tracing::info!("[Workflow] Step {} skipped: '{}' is false", step.id, expr);
                    logs.push(
                        WorkflowRunLog::start(step, Value::Object(context.clone()), 0)
                            .finish(StepStatus::Skipped),
                    );
                    current = branches.and_then(|n| n.on_success()).map(str::to_string);
                    continue;
                }
            }

            let tool_name = match self.check_step(step) {
                Ok(tool_name) => tool_name,
                Err(e) => {
                    logs.push(WorkflowRunLog::start(step, Value::Null, 0).failed(e.clone()));
                    self.alert_run_failure(scope, step, &e);
                    return Err(e);
                }
            };

            match self.run_step(step, &tool_name, scope, context, logs).await {
                Ok(output) => {
                    context.insert(format!("step_{}", step.id), output);
                    current = branches.and_then(|n| n.on_success()).map(str::to_string);
                }
                Err(e) => match branches.and_then(|n| n.on_failure()) {
                    Some(fallback) => {
                        tracing::warn!(
                            "[Workflow] Step {} failed, taking failure branch '{}'",
                            step.id,
                            fallback
                        );
                        current = Some(fallback.to_string());
                    }
                    None => {
                        let e = format!("Step '{}' failed: {}", step.id, e);
                        self.alert_run_failure(scope, step, &e);
                        return Err(e);
                    }
                },
            }
        }

        Ok(())
    }

    /// Configuration errors are not retried.
    fn check_step(&self, step: &WorkflowStep) -> Result<String, String> {
        let agent = self
            .registry
            .get_agent(&step.agent_id)
            .ok_or_else(|| format!("Agent '{}' not found", step.agent_id))?;
        if !agent.is_active {
            return Err(format!("Agent '{}' is inactive", agent.id));
        }

        let tool_name = step
            .params
            .tool_name
            .clone()
            .ok_or_else(|| format!("Step '{}' has no params.toolName", step.id))?;
        let tool = self
            .tools
            .get_tool(&tool_name)
            .ok_or_else(|| format!("Tool '{}' not found", tool_name))?;

        if !self.registry.can_agent_use_tool(&agent.id, &tool_name)
            || !tool.is_compatible_with(&agent.id)
        {
            return Err(format!(
                "Agent '{}' is not permitted to use tool '{}'",
                agent.id, tool_name
            ));
        }
        Ok(tool_name)
    }

    /// Attempt the step `retries + 1` times at most. Returns the tool output
    /// of the first successful attempt or the last error.
    async fn run_step(
        &self,
        step: &WorkflowStep,
        tool_name: &str,
        scope: &RunScope<'_>,
        context: &Map<String, Value>,
        logs: &mut Vec<WorkflowRunLog>,
    ) -> Result<Value, String> {
        let timeout = step
            .params
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.step_timeout);

        let mut args = context.clone();
        for (k, v) in &step.params.tool_args {
            args.insert(k.clone(), v.clone());
        }
        let input = Value::Object(args);

        let mut last_error = String::new();
        for attempt in 0..=step.retries {
            let mut log = WorkflowRunLog::start(step, input.clone(), attempt);
            log.status = StepStatus::Running;
            tracing::info!(
                "[Workflow] Step {} → {} (attempt {}/{})",
                step.id,
                tool_name,
                attempt.saturating_add(1),
                step.retries.saturating_add(1)
            );

            let result = match tokio::time::timeout(
                timeout,
                self.tools.execute_tool(tool_name, input.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => ToolResult::error(format!(
                    "Step '{}' timed out after {}ms",
                    step.id,
                    timeout.as_millis()
                )),
            };

            if result.success {
                let output = result.data.unwrap_or(Value::Null);
                let mut log = log.finish(StepStatus::Success);
                log.output = Some(output.clone());
                logs.push(log);
                return Ok(output);
            }

            last_error = result
                .error
                .unwrap_or_else(|| "Tool reported failure".to_string());
            logs.push(log.failed(last_error.clone()));
            self.alert_step_failure(scope, step, attempt, &last_error);
        }

        Err(last_error)
    }

    fn alert_step_failure(&self, scope: &RunScope<'_>, step: &WorkflowStep, attempt: u32, error: &str) {
        tracing::warn!(
            "[Workflow] Step {} attempt {} failed: {}",
            step.id,
            attempt.saturating_add(1),
            error
        );
        let details = json!({
            "runId": scope.run_id,
            "workflowId": scope.workflow_id,
            "userId": scope.user_id,
            "stepId": step.id,
            "agentId": step.agent_id,
            "attempt": attempt.saturating_add(1),
            "maxAttempts": step.retries.saturating_add(1),
            "error": error,
        });
        self.events.alert(
            SystemAlert::new(
                "workflow_step_failure",
                Severity::High,
                format!("Step '{}' failed: {}", step.id, error),
            )
            .with_context(details.clone()),
        );
        self.events.webhook(json!({ "type": "workflow_step_failure", "details": details }));
    }

    fn alert_run_failure(&self, scope: &RunScope<'_>, step: &WorkflowStep, error: &str) {
        self.events.alert(
            SystemAlert::new(
                "workflow_failure",
                Severity::Critical,
                format!("Workflow '{}' stopped: {}", scope.workflow_id, error),
            )
            .with_context(json!({
                "runId": scope.run_id,
                "workflowId": scope.workflow_id,
                "userId": scope.user_id,
                "stepId": step.id,
            })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::ConductorError;
    use crate::events::{EventSink, MemorySink};
    use crate::models::Agent;
    use crate::tools::{ToolCategory, ToolDefinition, ToolOutput, ToolSchema};

    struct Fixture {
        engine: WorkflowEngine,
        sink: Arc<MemorySink>,
        events: EventDispatcher,
        echo_calls: Arc<AtomicUsize>,
        slow_started: Arc<AtomicUsize>,
        slow_finished: Arc<AtomicUsize>,
    }

    fn fixture(max_steps: usize) -> Fixture {
        let registry = Arc::new(AgentRegistry::new());
        registry.register_agent(Agent::new("worker", "Worker", "x").with_tools(&[
            "echo", "broken", "slow",
        ]));
        registry.register_agent(Agent::new("outsider", "Outsider", "x"));

        let tools = Arc::new(ToolManager::new());
        let echo_calls = Arc::new(AtomicUsize::new(0));
        let counter = echo_calls.clone();
        tools
            .register_tool(ToolDefinition::from_fn(
                "echo",
                "returns its arguments",
                ToolCategory::Utility,
                ToolSchema::object(json!({}), &[]),
                move |args: Value| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, ConductorError>(ToolOutput::new(args)) }
                },
            ))
            .unwrap();
        tools
            .register_tool(ToolDefinition::from_fn(
                "broken",
                "always fails",
                ToolCategory::Utility,
                ToolSchema::object(json!({}), &[]),
                |_| async { Err::<ToolOutput, _>(ConductorError::Provider("boom".to_string())) },
            ))
            .unwrap();
        let slow_started = Arc::new(AtomicUsize::new(0));
        let slow_finished = Arc::new(AtomicUsize::new(0));
        let (started, finished) = (slow_started.clone(), slow_finished.clone());
        tools
            .register_tool(ToolDefinition::from_fn(
                "slow",
                "sleeps 200ms, then counts itself finished",
                ToolCategory::Utility,
                ToolSchema::object(json!({}), &[]),
                move |_: Value| {
                    started.fetch_add(1, Ordering::SeqCst);
                    let finished = finished.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, ConductorError>(ToolOutput::new(json!(null)))
                    }
                },
            ))
            .unwrap();

        let sink = Arc::new(MemorySink::new());
        let sinks: Vec<Arc<dyn EventSink>> = vec![sink.clone()];
        let (events, _handle) = EventDispatcher::spawn(64, sinks);
        let settings = WorkflowSettings {
            step_timeout_secs: 30,
            max_steps,
        };
        Fixture {
            engine: WorkflowEngine::new(registry, tools, events.clone(), &settings),
            sink,
            events,
            echo_calls,
            slow_started,
            slow_finished,
        }
    }

    fn request(yaml: &str) -> ExecuteWorkflowRequest {
        ExecuteWorkflowRequest {
            workflow_config: WorkflowConfig::from_yaml(yaml).unwrap(),
            user_id: "u1".to_string(),
            workflow_id: "wf-1".to_string(),
        }
    }

    fn statuses(result: &WorkflowRunResult) -> Vec<(&str, StepStatus)> {
        result
            .logs
            .iter()
            .map(|l| (l.step_id.as_str(), l.status))
            .collect()
    }

    #[tokio::test]
    async fn outputs_flow_into_the_context() {
        let f = fixture(64);
        let result = f
            .engine
            .execute_workflow(request(
                r#"
steps:
  - id: a
    agent_id: worker
    params:
      toolName: echo
      toolArgs:
        value: 42
        userId: overridden
    next: b
  - id: b
    agent_id: worker
    condition: "step_a.value == 42"
    params:
      toolName: echo
"#,
            ))
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(
            statuses(&result),
            vec![("a", StepStatus::Success), ("b", StepStatus::Success)]
        );
        assert_eq!(result.logs[0].input["userId"], "overridden");
        assert_eq!(result.final_context["userId"], "u1");
        assert_eq!(result.final_context["step_a"]["value"], 42);
        assert_eq!(result.final_context["step_b"]["step_a"]["value"], 42);
        assert_eq!(result.final_context["runId"], json!(result.run_id));

        f.events.flush().await;
        let alerts = f.sink.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "workflow_success");
        assert_eq!(alerts[0].severity, Severity::Low);
        let events = f.sink.events();
        assert_eq!(events[0].event_type, "workflow_run");
        assert_eq!(events[0].payload["success"], true);
    }

    #[tokio::test]
    async fn exhausted_retries_halt_the_run() {
        let f = fixture(64);
        let result = f
            .engine
            .execute_workflow(request(
                r#"
steps:
  - id: a
    agent_id: worker
    retries: 2
    params:
      toolName: broken
    next: b
  - id: b
    agent_id: worker
    params:
      toolName: echo
"#,
            ))
            .await;

        assert!(!result.success);
        assert_eq!(result.logs.len(), 3);
        assert!(result.logs.iter().all(|l| l.step_id == "a" && l.status == StepStatus::Fail));
        assert_eq!(
            result.logs.iter().map(|l| l.retries).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(f.echo_calls.load(Ordering::SeqCst), 0);
        assert!(result.error.unwrap().contains("Provider error: boom"));

        f.events.flush().await;
        let alerts = f.sink.alerts();
        let high = alerts.iter().filter(|a| a.severity == Severity::High).count();
        assert_eq!(high, 3);
        assert_eq!(alerts.last().unwrap().alert_type, "workflow_failure");
        assert_eq!(alerts.last().unwrap().severity, Severity::Critical);
        assert_eq!(f.sink.webhooks().len(), 3);
        assert_eq!(f.sink.events()[0].payload["success"], false);
    }

    #[tokio::test]
    async fn failure_branch_is_followed() {
        let f = fixture(64);
        let result = f
            .engine
            .execute_workflow(request(
                r#"
steps:
  - id: a
    agent_id: worker
    params:
      toolName: broken
    next: [b, recover]
  - id: b
    agent_id: worker
    params:
      toolName: echo
  - id: recover
    agent_id: worker
    params:
      toolName: echo
"#,
            ))
            .await;

        assert!(result.success);
        assert_eq!(
            statuses(&result),
            vec![("a", StepStatus::Fail), ("recover", StepStatus::Success)]
        );
        assert!(result.final_context.get("step_b").is_none());
        assert!(result.final_context.get("step_a").is_none());
    }

    #[tokio::test]
    async fn revisiting_a_step_aborts() {
        let f = fixture(64);
        let result = f
            .engine
            .execute_workflow(request(
                r#"
steps:
  - id: a
    agent_id: worker
    params: { toolName: echo }
    next: b
  - id: b
    agent_id: worker
    params: { toolName: echo }
    next: a
"#,
            ))
            .await;

        assert!(!result.success);
        assert_eq!(result.logs.len(), 2);
        assert!(result.error.unwrap().contains("Step 'a' was reached a second time"));
    }

    #[tokio::test]
    async fn max_steps_bounds_the_run() {
        let f = fixture(2);
        let result = f
            .engine
            .execute_workflow(request(
                r#"
steps:
  - { id: a, agent_id: worker, params: { toolName: echo }, next: b }
  - { id: b, agent_id: worker, params: { toolName: echo }, next: c }
  - { id: c, agent_id: worker, params: { toolName: echo } }
"#,
            ))
            .await;

        assert!(!result.success);
        assert_eq!(result.logs.len(), 2);
        assert_eq!(
            result.error.as_deref(),
            Some("Workflow exceeded the limit of 2 steps")
        );
    }

    #[tokio::test]
    async fn false_condition_skips_and_continues() {
        let f = fixture(64);
        let result = f
            .engine
            .execute_workflow(request(
                r#"
start: gate
steps:
  - id: done
    agent_id: worker
    params: { toolName: echo }
  - id: gate
    agent_id: worker
    condition: "approved"
    params: { toolName: broken }
    next: done
"#,
            ))
            .await;

        assert!(result.success);
        assert_eq!(
            statuses(&result),
            vec![("gate", StepStatus::Skipped), ("done", StepStatus::Success)]
        );
    }

    #[tokio::test]
    async fn configuration_errors_abort_without_retrying() {
        let f = fixture(64);
        for (yaml, expected) in [
            (
                "steps:\n  - { id: a, agent_id: ghost, retries: 3, params: { toolName: echo } }\n",
                "Agent 'ghost' not found",
            ),
            (
                "steps:\n  - { id: a, agent_id: outsider, retries: 3, params: { toolName: echo } }\n",
                "Agent 'outsider' is not permitted to use tool 'echo'",
            ),
            (
                "steps:\n  - { id: a, agent_id: worker, params: { toolName: nope } }\n",
                "Tool 'nope' not found",
            ),
            (
                "steps:\n  - { id: a, agent_id: worker }\n",
                "Step 'a' has no params.toolName",
            ),
        ] {
            let result = f.engine.execute_workflow(request(yaml)).await;
            assert!(!result.success);
            assert_eq!(result.logs.len(), 1, "{}", expected);
            assert_eq!(result.error.as_deref(), Some(expected));
        }
        assert_eq!(f.echo_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_graphs_never_start() {
        let f = fixture(64);
        let result = f
            .engine
            .execute_workflow(request(
                "steps:\n  - { id: a, agent_id: worker, params: { toolName: echo }, next: zzz }\n",
            ))
            .await;
        assert!(!result.success);
        assert!(result.logs.is_empty());
        assert!(result.error.unwrap().starts_with("Invalid workflow:"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_steps_time_out_and_count_as_failures() {
        let f = fixture(64);
        let result = f
            .engine
            .execute_workflow(request(
                r#"
steps:
  - id: a
    agent_id: worker
    retries: 1
    params:
      toolName: slow
      timeoutMs: 100
"#,
            ))
            .await;

        assert!(!result.success);
        assert_eq!(result.logs.len(), 2);
        assert_eq!(
            result.logs[0].error.as_deref(),
            Some("Step 'a' timed out after 100ms")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_attempts_are_cancelled() {
        let f = fixture(64);
        let result = f
            .engine
            .execute_workflow(request(
                r#"
steps:
  - id: a
    agent_id: worker
    retries: 2
    params:
      toolName: slow
      timeoutMs: 50
"#,
            ))
            .await;

        assert!(!result.success);
        assert_eq!(result.logs.len(), 3);
        assert_eq!(f.slow_started.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(f.slow_finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn huge_retry_budgets_do_not_overflow() {
        let f = fixture(64);
        let result = f
            .engine
            .execute_workflow(request(
                r#"
steps:
  - id: a
    agent_id: worker
    retries: 4294967295
    params:
      toolName: echo
"#,
            ))
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.logs.len(), 1);
    }
}
