//! Shared application state: every component wired once and owned here.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::agent_handler::AgentHandler;
use crate::catalog::AgentRegistry;
use crate::config::ConductorConfig;
use crate::error::ConductorError;
use crate::events::{EventDispatcher, EventSink, TracingSink, WebhookNotifier};
use crate::intent::KeywordIntentMatcher;
use crate::models::{AgentContext, AgentExecutionResult, MultiAgentResult};
use crate::orchestration::{Orchestrator, MULTI_AGENT_STRATEGY};
use crate::pipeline::MultiAgentPipeline;
use crate::providers::{
    ExtractiveLlm, HttpLlmProvider, InMemoryDocumentSource, KeywordSearch, LlmProvider,
};
use crate::queue::{Job, RetryQueue, ToolJobProcessor, WorkerHandle, TOOL_JOB_TYPE};
use crate::tools::builtin::{register_builtin_tools, ToolDeps};
use crate::tools::ToolManager;
use crate::workflow::{ExecuteWorkflowRequest, WorkflowConfig, WorkflowEngine, WorkflowRunResult};

/// Shared state accessible by every entry point.
pub struct AppStateInner {
    pub config: ConductorConfig,
    pub agent_registry: Arc<AgentRegistry>,
    pub tool_manager: Arc<ToolManager>,
    pub documents: Arc<InMemoryDocumentSource>,
    pub llm: Arc<dyn LlmProvider>,
    pub events: EventDispatcher,
    pub agent_handler: Arc<AgentHandler>,
    pub orchestrator: Arc<Orchestrator>,
    pub pipeline: MultiAgentPipeline,
    pub workflow_engine: WorkflowEngine,
    pub retry_queue: Arc<RetryQueue>,
    queue_worker: Mutex<Option<WorkerHandle>>,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Wire everything with the default sinks: tracing, plus a webhook
    /// notifier when `events.webhook_url` is set. Needs a Tokio runtime.
    pub fn new(config: ConductorConfig) -> Result<Self, ConductorError> {
        let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink)];
        if let Some(url) = config.events.webhook_url.as_deref().filter(|u| !u.is_empty()) {
            sinks.push(Arc::new(WebhookNotifier::new(url)?));
        }
        Self::with_sinks(config, sinks)
    }

    pub fn with_sinks(
        config: ConductorConfig,
        sinks: Vec<Arc<dyn EventSink>>,
    ) -> Result<Self, ConductorError> {
        let (events, _consumer) = EventDispatcher::spawn(config.events.channel_capacity, sinks);

        let documents = Arc::new(InMemoryDocumentSource::new());
        if let Some(dir) = &config.data_dir {
            let loaded = documents.load_dir(dir)?;
            tracing::info!("[AppState] Loaded {} data file(s) from {}", loaded, dir.display());
        }

        let llm = build_llm(&config)?;

        let tool_manager = Arc::new(ToolManager::new());
        register_builtin_tools(
            &tool_manager,
            &ToolDeps {
                documents: documents.clone(),
                llm: llm.clone(),
                search: Arc::new(KeywordSearch::new(documents.clone())),
            },
        )?;

        let agent_registry = Arc::new(AgentRegistry::with_seed_agents());
        if let Some(dir) = &config.agents_dir {
            let loaded = agent_registry.load_dir(dir)?;
            tracing::info!("[AppState] Loaded {} agent(s) from {}", loaded, dir.display());
        }
        for (agent_id, tool) in agent_registry.dangling_tool_refs(&tool_manager) {
            tracing::warn!(
                "[AppState] Agent '{}' allows unknown tool '{}'",
                agent_id,
                tool
            );
        }

        let agent_handler = Arc::new(AgentHandler::new(
            agent_registry.clone(),
            tool_manager.clone(),
            Arc::new(KeywordIntentMatcher::tools()),
            llm.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            agent_handler.clone(),
            Arc::new(KeywordIntentMatcher::domains()),
            &config.orchestrator.generalist_agent_id,
            &config.orchestrator.default_strategy,
        ));
        let pipeline =
            MultiAgentPipeline::new(orchestrator.clone(), agent_handler.clone(), events.clone());
        let workflow_engine = WorkflowEngine::new(
            agent_registry.clone(),
            tool_manager.clone(),
            events.clone(),
            &config.workflow,
        );
        let retry_queue = Arc::new(RetryQueue::new(
            events.clone(),
            config.queue.poll_interval(),
        ));
        retry_queue.register_processor(
            TOOL_JOB_TYPE,
            Arc::new(ToolJobProcessor::new(tool_manager.clone())),
        );
        let queue_worker = config
            .queue
            .worker_enabled
            .then(|| retry_queue.spawn_worker());

        Ok(Self {
            config,
            agent_registry,
            tool_manager,
            documents,
            llm,
            events,
            agent_handler,
            orchestrator,
            pipeline,
            workflow_engine,
            retry_queue,
            queue_worker: Mutex::new(queue_worker),
        })
    }

    /// Stop the queue worker and deliver queued events. Call once before exit.
    pub async fn shutdown(&self) {
        let worker = self.queue_worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            worker.shutdown().await;
        }
        self.events.flush().await;
    }

    // ─── Boundary surface ───────────────────────────────────────────────

    /// Route with the configured default strategy.
    pub async fn process_request(&self, prompt: &str, context: &AgentContext) -> MultiAgentResult {
        self.pipeline.execute(prompt, context, None).await
    }

    pub async fn execute_agent(
        &self,
        agent_id: &str,
        prompt: &str,
        context: &AgentContext,
    ) -> AgentExecutionResult {
        self.agent_handler.execute(agent_id, prompt, context).await
    }

    /// Generalist plus every detected specialist.
    pub async fn process_multi_agent_request(
        &self,
        prompt: &str,
        context: &AgentContext,
    ) -> MultiAgentResult {
        self.pipeline
            .execute(prompt, context, Some(MULTI_AGENT_STRATEGY))
            .await
    }

    pub async fn execute_workflow(&self, request: ExecuteWorkflowRequest) -> WorkflowRunResult {
        self.workflow_engine.execute_workflow(request).await
    }

    pub fn add_job(&self, job: Job) {
        self.retry_queue.add_job(job);
    }

    pub fn get_dead_letter_jobs(&self) -> Vec<Job> {
        self.retry_queue.get_dead_letter_jobs()
    }

    pub fn remove_dead_letter_job(&self, id: &str) -> bool {
        self.retry_queue.remove_dead_letter_job(id)
    }

    /// Structural problems plus references to agents or tools that do not exist.
    pub fn validate_workflow(&self, workflow: &WorkflowConfig) -> Vec<String> {
        let mut problems = workflow.validate();
        let mut reported = HashSet::new();
        for step in &workflow.steps {
            let agent_known = self.agent_registry.get_agent(&step.agent_id).is_some();
            if !agent_known && reported.insert(step.agent_id.clone()) {
                problems.push(format!(
                    "Step '{}' uses unknown agent '{}'",
                    step.id, step.agent_id
                ));
            }
            match &step.params.tool_name {
                None => problems.push(format!("Step '{}' has no params.toolName", step.id)),
                Some(tool) if !self.tool_manager.has_tool(tool) => problems.push(format!(
                    "Step '{}' uses unknown tool '{}'",
                    step.id, tool
                )),
                Some(tool)
                    if agent_known
                        && !self.agent_registry.can_agent_use_tool(&step.agent_id, tool) =>
                {
                    problems.push(format!(
                        "Step '{}': agent '{}' is not permitted to use tool '{}'",
                        step.id, step.agent_id, tool
                    ))
                }
                Some(_) => {}
            }
        }
        problems
    }
}

fn build_llm(config: &ConductorConfig) -> Result<Arc<dyn LlmProvider>, ConductorError> {
    match &config.llm {
        Some(settings) if !settings.api_key.is_empty() && !settings.api_key.starts_with("${") => {
            tracing::info!(
                "[AppState] Using LLM endpoint {} ({})",
                settings.base_url,
                settings.model
            );
            Ok(Arc::new(HttpLlmProvider::new(settings)?))
        }
        Some(_) => {
            tracing::warn!("[AppState] llm.api_key is not set, using the offline extractive provider");
            Ok(Arc::new(ExtractiveLlm::new()))
        }
        None => Ok(Arc::new(ExtractiveLlm::new())),
    }
}
