//! Multi-agent pipeline: the outer request path.
//!
//! Wraps the orchestrator with request logging, in-memory statistics and an
//! analytics event per request. Any internal failure, including a panic in
//! the routed work, comes back as a failed `MultiAgentResult` envelope.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agent_handler::AgentHandler;
use crate::events::EventDispatcher;
use crate::models::{AgentContext, AgentExecutionResult, MultiAgentResult};
use crate::orchestration::{combine_results, Orchestrator};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub requests: u64,
    pub failures: u64,
    pub total_execution_time_ms: u64,
}

impl PipelineStats {
    pub fn average_execution_time_ms(&self) -> u64 {
        if self.requests == 0 {
            0
        } else {
            self.total_execution_time_ms / self.requests
        }
    }
}

pub struct MultiAgentPipeline {
    orchestrator: Arc<Orchestrator>,
    handler: Arc<AgentHandler>,
    events: EventDispatcher,
    stats: Mutex<PipelineStats>,
}

impl MultiAgentPipeline {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        handler: Arc<AgentHandler>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            orchestrator,
            handler,
            events,
            stats: Mutex::new(PipelineStats::default()),
        }
    }

    /// Route with `strategy` (or the default) and run the selection concurrently.
    pub async fn execute(
        &self,
        prompt: &str,
        context: &AgentContext,
        strategy: Option<&str>,
    ) -> MultiAgentResult {
        let orchestrator = self.orchestrator.clone();
        let owned_prompt = prompt.to_string();
        let owned_context = context.clone();
        let strategy = strategy.map(str::to_string);

        self.guarded("route", prompt, context, async move {
            orchestrator
                .process_with_strategy(&owned_prompt, &owned_context, strategy.as_deref())
                .await
        })
        .await
    }

    /// Run exactly `agent_ids`, one after another, in the given order.
    pub async fn execute_with_agents(
        &self,
        prompt: &str,
        context: &AgentContext,
        agent_ids: &[String],
    ) -> MultiAgentResult {
        if agent_ids.is_empty() {
            let result = MultiAgentResult::failure("No agents were specified", 0);
            self.record("explicit", context, &result);
            return result;
        }

        let handler = self.handler.clone();
        let owned_prompt = prompt.to_string();
        let owned_context = context.clone();
        let ids = agent_ids.to_vec();

        self.guarded("explicit", prompt, context, async move {
            let started = Instant::now();
            let mut results: Vec<AgentExecutionResult> = Vec::with_capacity(ids.len());
            for id in &ids {
                results.push(handler.execute(id, &owned_prompt, &owned_context).await);
            }
            let mut result = combine_results(results, started.elapsed().as_millis() as u64);
            result.metadata.strategy = Some("explicit".to_string());
            result
        })
        .await
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Validate, run `work` on its own task and account for the outcome.
    async fn guarded<F>(
        &self,
        mode: &str,
        prompt: &str,
        context: &AgentContext,
        work: F,
    ) -> MultiAgentResult
    where
        F: Future<Output = MultiAgentResult> + Send + 'static,
    {
        let started = Instant::now();

        if prompt.trim().is_empty() {
            let result = MultiAgentResult::failure("Prompt must not be empty", 0);
            self.record(mode, context, &result);
            return result;
        }

        tracing::info!(
            "[Pipeline] {} request from {}: {}",
            mode,
            context.user_id,
            crate::truncate(prompt, 80)
        );

        let result = match tokio::spawn(work).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("[Pipeline] Request aborted: {}", e);
                MultiAgentResult::failure(
                    format!("The request could not be processed: {}", e),
                    started.elapsed().as_millis() as u64,
                )
            }
        };

        tracing::info!(
            "[Pipeline] {} request finished: success={} agents={:?} ({}ms)",
            mode,
            result.success,
            result.metadata.agents_used,
            result.metadata.total_execution_time_ms
        );
        self.record(mode, context, &result);
        result
    }

    fn record(&self, mode: &str, context: &AgentContext, result: &MultiAgentResult) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.requests += 1;
            if !result.success {
                stats.failures += 1;
            }
            stats.total_execution_time_ms += result.metadata.total_execution_time_ms;
            tracing::debug!(
                "[Pipeline] {} request(s), {} failed, avg {}ms",
                stats.requests,
                stats.failures,
                stats.average_execution_time_ms()
            );
        }

        self.events.analytics(
            &context.user_id,
            "multi_agent_request",
            json!({
                "mode": mode,
                "success": result.success,
                "strategy": result.metadata.strategy,
                "agentsUsed": result.metadata.agents_used,
                "errors": result.metadata.errors,
                "executionTimeMs": result.metadata.total_execution_time_ms,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    use crate::catalog::AgentRegistry;
    use crate::error::ConductorError;
    use crate::events::{EventSink, MemorySink};
    use crate::intent::KeywordIntentMatcher;
    use crate::models::Agent;
    use crate::orchestration::KEYWORD_STRATEGY;
    use crate::providers::ExtractiveLlm;
    use crate::tools::{ToolCategory, ToolDefinition, ToolManager, ToolOutput, ToolSchema};

    struct Fixture {
        pipeline: MultiAgentPipeline,
        sink: Arc<MemorySink>,
        events: EventDispatcher,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(AgentRegistry::new());
        registry.register_agent(Agent::new("general", "General", "x").with_tools(&["explode"]));
        registry.register_agent(Agent::new("fin", "Finance", "x").with_tools(&["explode"]));

        let tools = Arc::new(ToolManager::new());
        tools
            .register_tool(ToolDefinition::from_fn(
                "explode",
                "fails loudly",
                ToolCategory::Utility,
                ToolSchema::object(json!({}), &[]),
                |_: Value| async { Err::<ToolOutput, _>(ConductorError::Internal("kaboom".to_string())) },
            ))
            .unwrap();

        let handler = Arc::new(AgentHandler::new(
            registry,
            tools,
            Arc::new(KeywordIntentMatcher::new().with_rule("explode", &["explode"])),
            Arc::new(ExtractiveLlm::new()),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            handler.clone(),
            Arc::new(KeywordIntentMatcher::new().with_rule("fin", &["budget"])),
            "general",
            KEYWORD_STRATEGY,
        ));

        let sink = Arc::new(MemorySink::new());
        let sinks: Vec<Arc<dyn EventSink>> = vec![sink.clone()];
        let (events, _handle) = EventDispatcher::spawn(16, sinks);
        Fixture {
            pipeline: MultiAgentPipeline::new(orchestrator, handler, events.clone()),
            sink,
            events,
        }
    }

    #[tokio::test]
    async fn routes_and_records_stats() {
        let f = fixture();
        let ctx = AgentContext::new("u1");

        let result = f.pipeline.execute("Draft a budget memo", &ctx, None).await;
        assert!(result.success);
        assert_eq!(result.metadata.agents_used, vec!["fin"]);

        let result = f.pipeline.execute("explode the budget", &ctx, None).await;
        assert!(!result.success);

        let stats = f.pipeline.stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(
            stats.average_execution_time_ms(),
            stats.total_execution_time_ms / 2
        );
        assert_eq!(PipelineStats::default().average_execution_time_ms(), 0);

        f.events.flush().await;
        let events = f.sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "multi_agent_request");
        assert_eq!(events[0].payload["strategy"], "keyword");
        assert_eq!(events[1].payload["success"], false);
    }

    #[tokio::test]
    async fn explicit_agents_run_in_order() {
        let f = fixture();
        let ids = vec!["fin".to_string(), "nobody".to_string(), "general".to_string()];
        let result = f
            .pipeline
            .execute_with_agents("hello", &AgentContext::new("u1"), &ids)
            .await;

        let order: Vec<&str> = result.agent_results.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(order, vec!["fin", "nobody", "general"]);
        assert!(result.success);
        assert_eq!(result.metadata.strategy.as_deref(), Some("explicit"));
        assert!(result.response.contains("## Finance"));
        assert!(result.response.contains("- nobody: Not found: Agent 'nobody' not found"));
    }

    #[tokio::test]
    async fn empty_input_yields_the_failure_envelope() {
        let f = fixture();
        let ctx = AgentContext::new("u1");

        let result = f.pipeline.execute("   ", &ctx, None).await;
        assert!(!result.success);
        assert!(result.agent_results.is_empty());
        assert_eq!(result.response, "Prompt must not be empty");

        let result = f.pipeline.execute_with_agents("hi", &ctx, &[]).await;
        assert!(!result.success);
        assert_eq!(result.response, "No agents were specified");
        assert_eq!(f.pipeline.stats().failures, 2);
    }
}
