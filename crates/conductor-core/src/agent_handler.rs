//! Executes one agent against one prompt.
//!
//! Per invocation: match candidate tools, drop the ones the agent may not use
//! (recording why), build arguments from the request context, run the rest in
//! match order and aggregate everything into one textual response. Nothing
//! here returns an error to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};

use crate::catalog::AgentRegistry;
use crate::error::ConductorError;
use crate::intent::{IntentMatch, IntentMatcher};
use crate::models::{Agent, AgentContext, AgentExecutionResult, ToolCallRecord};
use crate::providers::{ChatMessage, ChatOptions, LlmProvider};
use crate::tools::{ToolManager, ToolResult};

pub struct AgentHandler {
    registry: Arc<AgentRegistry>,
    tools: Arc<ToolManager>,
    matcher: Arc<dyn IntentMatcher>,
    llm: Arc<dyn LlmProvider>,
}

impl AgentHandler {
    pub fn new(
        registry: Arc<AgentRegistry>,
        tools: Arc<ToolManager>,
        matcher: Arc<dyn IntentMatcher>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            registry,
            tools,
            matcher,
            llm,
        }
    }

    pub async fn execute(
        &self,
        agent_id: &str,
        prompt: &str,
        context: &AgentContext,
    ) -> AgentExecutionResult {
        let started = Instant::now();
        let mut result = match self.run(agent_id, prompt, context).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("[AgentHandler] Agent {} failed: {}", agent_id, e);
                let name = self
                    .registry
                    .get_agent(agent_id)
                    .map(|a| a.name)
                    .unwrap_or_else(|| agent_id.to_string());
                AgentExecutionResult::failed(agent_id, &name, e.to_string())
            }
        };
        result.execution_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    async fn run(
        &self,
        agent_id: &str,
        prompt: &str,
        context: &AgentContext,
    ) -> Result<AgentExecutionResult, ConductorError> {
        let agent = self
            .registry
            .get_agent(agent_id)
            .ok_or_else(|| ConductorError::NotFound(format!("Agent '{}' not found", agent_id)))?;
        if !agent.is_active {
            return Err(ConductorError::Unauthorized(format!(
                "Agent '{}' is inactive",
                agent_id
            )));
        }

        let mut candidates = self.matcher.match_intent(prompt).await;
        candidates.truncate(agent.config.max_tools_per_request);

        tracing::info!(
            "[AgentHandler] {} matched {} tool(s): {:?}",
            agent.id,
            candidates.len(),
            candidates.iter().map(|c| &c.target).collect::<Vec<_>>()
        );

        if candidates.is_empty() {
            return self.answer_directly(&agent, prompt, context).await;
        }

        let mut tool_calls = Vec::new();
        let mut errors = Vec::new();

        for candidate in candidates {
            if let Err(reason) = self.authorize(&agent, &candidate.target) {
                tracing::warn!("[AgentHandler] {}", reason);
                errors.push(reason);
                continue;
            }

            let arguments = build_arguments(&candidate, &agent, prompt, context);
            let result = self
                .call_with_timeout(&candidate.target, arguments.clone(), agent.config.timeout_ms)
                .await;
            tool_calls.push(ToolCallRecord {
                tool_name: candidate.target,
                arguments,
                result,
            });
        }

        let success = errors.is_empty() && tool_calls.iter().any(|c| c.result.success);
        Ok(AgentExecutionResult {
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            success,
            response: format_response(&tool_calls, &errors),
            error: (!success).then(|| {
                if errors.is_empty() {
                    "No tool call succeeded".to_string()
                } else {
                    errors.join("; ")
                }
            }),
            tool_calls,
            execution_time_ms: 0,
        })
    }

    fn authorize(&self, agent: &Agent, tool_name: &str) -> Result<(), String> {
        if !self.registry.can_agent_use_tool(&agent.id, tool_name) {
            return Err(format!(
                "Agent '{}' is not permitted to use tool '{}'",
                agent.id, tool_name
            ));
        }
        if let Some(tool) = self.tools.get_tool(tool_name) {
            if !tool.is_compatible_with(&agent.id) {
                return Err(format!(
                    "Tool '{}' is not available to agent '{}'",
                    tool_name, agent.id
                ));
            }
        }
        Ok(())
    }

    async fn call_with_timeout(&self, tool_name: &str, args: Value, timeout_ms: u64) -> ToolResult {
        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.tools.execute_tool(tool_name, args),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => ToolResult::error(format!(
                "Tool '{}' timed out after {}ms",
                tool_name, timeout_ms
            )),
        }
    }

    /// No tool matched: answer with the agent's own prompt through the LLM.
    async fn answer_directly(
        &self,
        agent: &Agent,
        prompt: &str,
        context: &AgentContext,
    ) -> Result<AgentExecutionResult, ConductorError> {
        let mut messages: Vec<ChatMessage> = context
            .conversation_history
            .iter()
            .map(|t| ChatMessage {
                role: t.role.clone(),
                content: t.content.clone(),
            })
            .collect();
        messages.push(ChatMessage::user(prompt));

        let opts = ChatOptions {
            system: Some(agent.system_prompt.clone()).filter(|s| !s.is_empty()),
            ..Default::default()
        };
        let completion = tokio::time::timeout(
            Duration::from_millis(agent.config.timeout_ms),
            self.llm.chat_completion(&messages, &opts),
        )
        .await
        .map_err(|_| {
            ConductorError::Timeout(format!(
                "Agent '{}' did not answer within {}ms",
                agent.id, agent.config.timeout_ms
            ))
        })??;

        Ok(AgentExecutionResult {
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            success: true,
            response: completion.content,
            tool_calls: Vec::new(),
            execution_time_ms: 0,
            error: None,
        })
    }
}

/// Matcher arguments, then host-supplied parameters, then the request identity.
fn build_arguments(
    candidate: &IntentMatch,
    agent: &Agent,
    prompt: &str,
    context: &AgentContext,
) -> Value {
    let mut args: Map<String, Value> = candidate.arguments.clone();
    for (k, v) in &context.parameters {
        args.insert(k.clone(), v.clone());
    }
    args.insert("userId".to_string(), json!(context.user_id));
    args.insert("prompt".to_string(), json!(prompt));
    args.insert("agentId".to_string(), json!(agent.id));
    if let Some(ws) = &context.workspace_id {
        args.insert("workspaceId".to_string(), json!(ws));
    }
    Value::Object(args)
}

fn describe_data(data: &Option<Value>) -> String {
    let Some(data) = data else {
        return "done".to_string();
    };
    for key in ["summary", "content", "review"] {
        if let Some(text) = data.get(key).and_then(Value::as_str) {
            return crate::truncate(text, 300);
        }
    }
    crate::truncate(&data.to_string(), 200)
}

fn format_response(calls: &[ToolCallRecord], errors: &[String]) -> String {
    let mut sections = Vec::new();

    let ok: Vec<String> = calls
        .iter()
        .filter(|c| c.result.success)
        .map(|c| format!("- {}: {}", c.tool_name, describe_data(&c.result.data)))
        .collect();
    if !ok.is_empty() {
        sections.push(format!("Successful operations:\n{}", ok.join("\n")));
    }

    let failed: Vec<String> = calls
        .iter()
        .filter(|c| !c.result.success)
        .map(|c| {
            format!(
                "- {}: {}",
                c.tool_name,
                c.result.error.as_deref().unwrap_or("unknown error")
            )
        })
        .collect();
    if !failed.is_empty() {
        sections.push(format!("Failed operations:\n{}", failed.join("\n")));
    }

    if !errors.is_empty() {
        let lines: Vec<String> = errors.iter().map(|e| format!("- {}", e)).collect();
        sections.push(format!("Errors:\n{}", lines.join("\n")));
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::KeywordIntentMatcher;
    use crate::providers::ExtractiveLlm;
    use crate::tools::{ToolCategory, ToolDefinition, ToolOutput, ToolSchema};

    fn handler(registry: AgentRegistry, tools: ToolManager, matcher: KeywordIntentMatcher) -> AgentHandler {
        AgentHandler::new(
            Arc::new(registry),
            Arc::new(tools),
            Arc::new(matcher),
            Arc::new(ExtractiveLlm::new()),
        )
    }

    fn echo(name: &str) -> ToolDefinition {
        ToolDefinition::from_fn(
            name,
            "echo",
            ToolCategory::Utility,
            ToolSchema::object(json!({}), &["userId"]),
            |args| async move { Ok::<_, ConductorError>(ToolOutput::new(args)) },
        )
    }

    #[tokio::test]
    async fn unauthorized_tool_is_recorded_not_invoked() {
        let registry = AgentRegistry::new();
        registry.register_agent(Agent::new("fin", "Finance", "financial").with_tools(&["calc"]));
        let tools = ToolManager::new();
        tools.register_tool(echo("calc")).unwrap();
        tools.register_tool(echo("email")).unwrap();
        let matcher = KeywordIntentMatcher::new()
            .with_rule("calc", &["calculate"])
            .with_rule("email", &["email"]);
        let handler = handler(registry, tools, matcher);

        let ctx = AgentContext::new("u1").with_parameter("amount", json!(10));
        let result = handler.execute("fin", "calculate and email it", &ctx).await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Agent 'fin' is not permitted to use tool 'email'")
        );
        assert_eq!(result.tools_used(), vec!["calc"]);
        assert_eq!(result.tool_calls[0].arguments["amount"], 10);
        assert_eq!(result.tool_calls[0].arguments["agentId"], "fin");
        assert!(result.response.contains("Successful operations"));
        assert!(result
            .response
            .contains("Agent 'fin' is not permitted to use tool 'email'"));
        assert_eq!(handler.tools.get_usage_stats().get("email"), None);
    }

    #[tokio::test]
    async fn candidates_are_capped_per_request() {
        let registry = AgentRegistry::new();
        let mut agent = Agent::new("ops", "Ops", "x").with_tools(&["a", "b", "c"]);
        agent.config.max_tools_per_request = 2;
        registry.register_agent(agent);
        let tools = ToolManager::new();
        for name in ["a", "b", "c"] {
            tools.register_tool(echo(name)).unwrap();
        }
        let matcher = KeywordIntentMatcher::new()
            .with_rule("a", &["alpha"])
            .with_rule("b", &["beta"])
            .with_rule("c", &["gamma"]);
        let handler = handler(registry, tools, matcher);

        let result = handler
            .execute("ops", "alpha beta gamma", &AgentContext::new("u1"))
            .await;

        assert!(result.success);
        assert_eq!(result.tools_used(), vec!["a", "b"]);
        assert_eq!(handler.tools.get_usage_stats().get("c"), None);
    }

    #[tokio::test]
    async fn incompatible_tool_is_rejected_before_execution() {
        let registry = AgentRegistry::new();
        registry.register_agent(Agent::new("hr", "HR", "hr").with_tools(&["payroll"]));
        let tools = ToolManager::new();
        tools
            .register_tool(echo("payroll").with_agent_compatibility(&["fin"]))
            .unwrap();
        let handler = handler(
            registry,
            tools,
            KeywordIntentMatcher::new().with_rule("payroll", &["payroll"]),
        );

        let result = handler
            .execute("hr", "run payroll", &AgentContext::new("u1"))
            .await;

        assert!(!result.success);
        assert!(result.tool_calls.is_empty());
        assert_eq!(
            result.error.as_deref(),
            Some("Tool 'payroll' is not available to agent 'hr'")
        );
        assert_eq!(handler.tools.get_usage_stats().get("payroll"), None);
    }

    #[tokio::test]
    async fn failing_tools_make_the_result_fail() {
        let registry = AgentRegistry::new();
        registry.register_agent(Agent::new("a", "A", "x").with_tools(&["broken"]));
        let tools = ToolManager::new();
        tools
            .register_tool(ToolDefinition::from_fn(
                "broken",
                "fails",
                ToolCategory::Utility,
                ToolSchema::object(json!({}), &[]),
                |_| async { Err::<ToolOutput, _>(ConductorError::Provider("down".to_string())) },
            ))
            .unwrap();
        let handler = handler(registry, tools, KeywordIntentMatcher::new().with_rule("broken", &["go"]));

        let result = handler.execute("a", "go", &AgentContext::new("u1")).await;
        assert!(!result.success);
        assert!(result.response.starts_with("Failed operations:\n- broken: Provider error: down"));
    }

    #[tokio::test]
    async fn unknown_and_inactive_agents_fail_gracefully() {
        let registry = AgentRegistry::new();
        registry.register_agent(Agent::new("sleepy", "Sleepy", "x"));
        registry.deactivate_agent("sleepy");
        let handler = handler(registry, ToolManager::new(), KeywordIntentMatcher::new());

        let result = handler.execute("ghost", "hi", &AgentContext::new("u1")).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Not found: Agent 'ghost' not found"));

        let result = handler.execute("sleepy", "hi", &AgentContext::new("u1")).await;
        assert!(!result.success);
        assert_eq!(result.agent_name, "Sleepy");
    }

    #[tokio::test]
    async fn no_match_falls_back_to_the_llm() {
        let registry = AgentRegistry::new();
        registry.register_agent(
            Agent::new("g", "General", "generalist").with_system_prompt("## Helper\nBe nice."),
        );
        let handler = handler(registry, ToolManager::new(), KeywordIntentMatcher::new());

        let result = handler
            .execute("g", "What is a good name for a cat?", &AgentContext::new("u1"))
            .await;
        assert!(result.success);
        assert!(result.tool_calls.is_empty());
        assert_eq!(result.response, "Helper\n\nWhat is a good name for a cat?");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tools_time_out() {
        let registry = AgentRegistry::new();
        let mut agent = Agent::new("a", "A", "x").with_tools(&["slow"]);
        agent.config.timeout_ms = 50;
        registry.register_agent(agent);
        let tools = ToolManager::new();
        tools
            .register_tool(ToolDefinition::from_fn(
                "slow",
                "sleeps",
                ToolCategory::Utility,
                ToolSchema::object(json!({}), &[]),
                |_| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, ConductorError>(ToolOutput::new(json!(null)))
                },
            ))
            .unwrap();
        let handler = handler(registry, tools, KeywordIntentMatcher::new().with_rule("slow", &["wait"]));

        let result = handler.execute("a", "wait", &AgentContext::new("u1")).await;
        assert!(!result.success);
        assert_eq!(
            result.tool_calls[0].result.error.as_deref(),
            Some("Tool 'slow' timed out after 50ms")
        );
    }
}
