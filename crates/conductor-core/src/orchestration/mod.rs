//! Orchestrator - maps prompts to agents and fans execution out across them.
//!
//! A routing strategy turns `(prompt, context)` into an ordered list of agent
//! ids. Two strategies are built in:
//!   1. `keyword`     - domain specialists named by the prompt, else the generalist
//!   2. `multi-agent` - the generalist plus every detected specialist
//!
//! `execute_multi_agent` runs the selected agents concurrently (one task per
//! agent) and returns their results in the order the ids were given.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;

use crate::agent_handler::AgentHandler;
use crate::intent::IntentMatcher;
use crate::models::{AgentContext, AgentExecutionResult, MultiAgentMetadata, MultiAgentResult};

pub const KEYWORD_STRATEGY: &str = "keyword";
pub const MULTI_AGENT_STRATEGY: &str = "multi-agent";

// ─── Strategies ───────────────────────────────────────────────────────────

#[async_trait]
pub trait RoutingStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn select_agents(&self, prompt: &str, context: &AgentContext) -> Vec<String>;
}

fn dedup_preserving_order(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

pub struct KeywordStrategy {
    matcher: Arc<dyn IntentMatcher>,
    generalist_id: String,
}

impl KeywordStrategy {
    pub fn new(matcher: Arc<dyn IntentMatcher>, generalist_id: &str) -> Self {
        Self {
            matcher,
            generalist_id: generalist_id.to_string(),
        }
    }
}

#[async_trait]
impl RoutingStrategy for KeywordStrategy {
    fn name(&self) -> &str {
        KEYWORD_STRATEGY
    }

    async fn select_agents(&self, prompt: &str, _context: &AgentContext) -> Vec<String> {
        let specialists = self.matcher.match_intent(prompt).await;
        if specialists.is_empty() {
            return vec![self.generalist_id.clone()];
        }
        dedup_preserving_order(specialists.into_iter().map(|m| m.target))
    }
}

pub struct MultiAgentStrategy {
    matcher: Arc<dyn IntentMatcher>,
    generalist_id: String,
}

impl MultiAgentStrategy {
    pub fn new(matcher: Arc<dyn IntentMatcher>, generalist_id: &str) -> Self {
        Self {
            matcher,
            generalist_id: generalist_id.to_string(),
        }
    }
}

#[async_trait]
impl RoutingStrategy for MultiAgentStrategy {
    fn name(&self) -> &str {
        MULTI_AGENT_STRATEGY
    }

    async fn select_agents(&self, prompt: &str, _context: &AgentContext) -> Vec<String> {
        let specialists = self.matcher.match_intent(prompt).await;
        dedup_preserving_order(
            std::iter::once(self.generalist_id.clone())
                .chain(specialists.into_iter().map(|m| m.target)),
        )
    }
}

// ─── Orchestrator ─────────────────────────────────────────────────────────

/// Which strategy ran and what it picked.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub strategy: String,
    pub agent_ids: Vec<String>,
}

pub struct Orchestrator {
    handler: Arc<AgentHandler>,
    strategies: RwLock<HashMap<String, Arc<dyn RoutingStrategy>>>,
    fallback: Arc<dyn RoutingStrategy>,
    default_strategy: String,
}

impl Orchestrator {
    /// Orchestrator with the `keyword` and `multi-agent` strategies built on
    /// `domain_matcher`.
    pub fn new(
        handler: Arc<AgentHandler>,
        domain_matcher: Arc<dyn IntentMatcher>,
        generalist_id: &str,
        default_strategy: &str,
    ) -> Self {
        let keyword: Arc<dyn RoutingStrategy> =
            Arc::new(KeywordStrategy::new(domain_matcher.clone(), generalist_id));
        let multi: Arc<dyn RoutingStrategy> =
            Arc::new(MultiAgentStrategy::new(domain_matcher, generalist_id));

        let mut strategies = HashMap::new();
        strategies.insert(KEYWORD_STRATEGY.to_string(), keyword.clone());
        strategies.insert(MULTI_AGENT_STRATEGY.to_string(), multi);

        Self {
            handler,
            strategies: RwLock::new(strategies),
            fallback: keyword,
            default_strategy: default_strategy.to_string(),
        }
    }

    pub fn register_strategy(&self, strategy: Arc<dyn RoutingStrategy>) {
        if let Ok(mut strategies) = self.strategies.write() {
            tracing::info!("[Orchestrator] Registered strategy: {}", strategy.name());
            strategies.insert(strategy.name().to_string(), strategy);
        }
    }

    pub fn strategy_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .strategies
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn default_strategy(&self) -> &str {
        &self.default_strategy
    }

    /// Look up a strategy by name, falling back to `keyword` for unknown names.
    fn resolve_strategy(&self, name: Option<&str>) -> Arc<dyn RoutingStrategy> {
        let name = name.unwrap_or(&self.default_strategy);
        match self.strategies.read().ok().and_then(|s| s.get(name).cloned()) {
            Some(strategy) => strategy,
            None => {
                tracing::warn!(
                    "[Orchestrator] Unknown strategy '{}', falling back to '{}'",
                    name,
                    KEYWORD_STRATEGY
                );
                self.fallback.clone()
            }
        }
    }

    pub async fn route(
        &self,
        prompt: &str,
        context: &AgentContext,
        strategy: Option<&str>,
    ) -> RoutingDecision {
        let strategy = self.resolve_strategy(strategy);
        let agent_ids = strategy.select_agents(prompt, context).await;
        tracing::info!(
            "[Orchestrator] Strategy '{}' selected: {:?}",
            strategy.name(),
            agent_ids
        );
        RoutingDecision {
            strategy: strategy.name().to_string(),
            agent_ids,
        }
    }

    pub async fn execute_agent(
        &self,
        agent_id: &str,
        prompt: &str,
        context: &AgentContext,
    ) -> AgentExecutionResult {
        self.handler.execute(agent_id, prompt, context).await
    }

    /// Run every agent concurrently. Results keep the order of `agent_ids`.
    pub async fn execute_multi_agent(
        &self,
        prompt: &str,
        context: &AgentContext,
        agent_ids: &[String],
    ) -> MultiAgentResult {
        let started = Instant::now();

        let handles: Vec<_> = agent_ids
            .iter()
            .map(|id| {
                let handler = self.handler.clone();
                let id = id.clone();
                let prompt = prompt.to_string();
                let context = context.clone();
                tokio::spawn(async move { handler.execute(&id, &prompt, &context).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (id, handle) in agent_ids.iter().zip(handles) {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => AgentExecutionResult::failed(id, id, format!("Agent task aborted: {}", e)),
            });
        }

        combine_results(results, started.elapsed().as_millis() as u64)
    }

    /// Route with the configured default strategy and execute the selection.
    pub async fn process_request(&self, prompt: &str, context: &AgentContext) -> MultiAgentResult {
        self.process_with_strategy(prompt, context, None).await
    }

    pub async fn process_with_strategy(
        &self,
        prompt: &str,
        context: &AgentContext,
        strategy: Option<&str>,
    ) -> MultiAgentResult {
        let decision = self.route(prompt, context, strategy).await;
        let mut result = self
            .execute_multi_agent(prompt, context, &decision.agent_ids)
            .await;
        result.metadata.strategy = Some(decision.strategy);
        result
    }
}

// ─── Synthesis ────────────────────────────────────────────────────────────

/// Build the aggregate result for a set of per-agent outcomes.
pub fn combine_results(results: Vec<AgentExecutionResult>, elapsed_ms: u64) -> MultiAgentResult {
    let errors: Vec<String> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| {
            format!(
                "{}: {}",
                r.agent_id,
                r.error.as_deref().unwrap_or("failed")
            )
        })
        .collect();

    MultiAgentResult {
        success: results.iter().any(|r| r.success),
        response: synthesize_responses(&results),
        metadata: MultiAgentMetadata {
            total_execution_time_ms: elapsed_ms,
            agents_used: results.iter().map(|r| r.agent_id.clone()).collect(),
            errors,
            strategy: None,
        },
        agent_results: results,
    }
}

/// One clean success passes through untouched; otherwise each successful
/// agent gets an attributed section and failures are listed after them.
pub fn synthesize_responses(results: &[AgentExecutionResult]) -> String {
    let successes: Vec<&AgentExecutionResult> = results.iter().filter(|r| r.success).collect();
    let failures: Vec<&AgentExecutionResult> = results.iter().filter(|r| !r.success).collect();

    if successes.len() == 1 && failures.is_empty() {
        return successes[0].response.clone();
    }

    let mut sections: Vec<String> = successes
        .iter()
        .map(|r| format!("## {}\n{}", r.agent_name, r.response))
        .collect();

    if successes.is_empty() {
        sections.push("No agent was able to complete the request.".to_string());
    }

    if !failures.is_empty() {
        let lines: Vec<String> = failures
            .iter()
            .map(|r| {
                format!(
                    "- {}: {}",
                    r.agent_name,
                    r.error.as_deref().unwrap_or("failed")
                )
            })
            .collect();
        sections.push(format!("Failed agents:\n{}", lines.join("\n")));
    }

    sections.join("\n\n")
}
