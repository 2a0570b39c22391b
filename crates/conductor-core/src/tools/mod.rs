//! Tool catalog and execution.
//!
//! The `ToolManager` owns every registered tool definition together with the
//! per-tool usage counters. Its execution contract never fails across the
//! boundary: unknown tools, missing arguments, executor errors and executor
//! panics all come back as a `ToolResult` with `success == false`.

pub mod builtin;

use std::collections::{BTreeMap, HashMap};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConductorError;

// ─── Categories & Schema ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Document,
    Analysis,
    Communication,
    Automation,
    Utility,
    Financial,
    Hr,
    Legal,
    Marketing,
    Product,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Analysis => "analysis",
            Self::Communication => "communication",
            Self::Automation => "automation",
            Self::Utility => "utility",
            Self::Financial => "financial",
            Self::Hr => "hr",
            Self::Legal => "legal",
            Self::Marketing => "marketing",
            Self::Product => "product",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "document" => Some(Self::Document),
            "analysis" => Some(Self::Analysis),
            "communication" => Some(Self::Communication),
            "automation" => Some(Self::Automation),
            "utility" => Some(Self::Utility),
            "financial" => Some(Self::Financial),
            "hr" => Some(Self::Hr),
            "legal" => Some(Self::Legal),
            "marketing" => Some(Self::Marketing),
            "product" => Some(Self::Product),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// JSON-Schema-like description of a tool's parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl ToolSchema {
    /// Object schema from a `properties` JSON object and the required names.
    pub fn object(properties: Value, required: &[&str]) -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: match properties {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            required: required.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Required parameter names that are absent or null in `args`.
    pub fn missing_required(&self, args: &Value) -> Vec<String> {
        self.required
            .iter()
            .filter(|name| args.get(name.as_str()).map_or(true, Value::is_null))
            .cloned()
            .collect()
    }
}

// ─── Results ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Result of a tool operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: ToolResultMetadata,
}

impl ToolResult {
    pub fn success(data: impl Serialize) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or_default()),
            error: None,
            metadata: ToolResultMetadata::default(),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
            metadata: ToolResultMetadata::default(),
        }
    }

    fn with_elapsed(mut self, started: Instant) -> Self {
        self.metadata.execution_time_ms = Some(started.elapsed().as_millis() as u64);
        self
    }
}

/// What a tool executor hands back on success.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub data: Value,
    pub tokens_used: Option<u64>,
    pub cost: Option<f64>,
}

impl ToolOutput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }
}

// ─── Definitions ─────────────────────────────────────────────────────────

/// Executor behind a tool definition.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<ToolOutput, ConductorError>;
}

/// Adapts an async closure into a `ToolHandler`.
pub struct FnTool<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolOutput, ConductorError>> + Send + 'static,
{
    async fn call(&self, args: Value) -> Result<ToolOutput, ConductorError> {
        (self.0)(args).await
    }
}

/// A registered tool. Immutable once handed to the manager.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub schema: ToolSchema,
    /// Agent ids allowed to use this tool. `None` means any agent.
    pub agent_compatibility: Option<Vec<String>>,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    pub fn new(
        name: &str,
        description: &str,
        category: ToolCategory,
        schema: ToolSchema,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            category,
            schema,
            agent_compatibility: None,
            handler: Arc::new(handler),
        }
    }

    pub fn from_fn<F, Fut>(
        name: &str,
        description: &str,
        category: ToolCategory,
        schema: ToolSchema,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ConductorError>> + Send + 'static,
    {
        Self::new(name, description, category, schema, FnTool(f))
    }

    pub fn with_agent_compatibility(mut self, agent_ids: &[&str]) -> Self {
        self.agent_compatibility = Some(agent_ids.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn is_compatible_with(&self, agent_id: &str) -> bool {
        self.agent_compatibility
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| id == agent_id))
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("agent_compatibility", &self.agent_compatibility)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsage {
    pub count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

/// Usage-annotated tool metadata, as listed by the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub schema: ToolSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_compatibility: Option<Vec<String>>,
    pub usage: ToolUsage,
}

// ─── Manager ─────────────────────────────────────────────────────────────

pub struct ToolManager {
    tools: RwLock<BTreeMap<String, Arc<ToolDefinition>>>,
    usage: Mutex<HashMap<String, ToolUsage>>,
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolManager {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
            usage: Mutex::new(HashMap::new()),
        }
    }

    /// Register a tool. Names are unique; a second registration is rejected.
    pub fn register_tool(&self, tool: ToolDefinition) -> Result<(), ConductorError> {
        let mut tools = self
            .tools
            .write()
            .map_err(|_| ConductorError::Internal("tool registry lock poisoned".to_string()))?;
        if tools.contains_key(&tool.name) {
            return Err(ConductorError::Conflict(format!(
                "Tool '{}' is already registered",
                tool.name
            )));
        }
        tracing::info!(
            "[ToolManager] Registered tool: {} ({})",
            tool.name,
            tool.category
        );
        tools.insert(tool.name.clone(), Arc::new(tool));
        Ok(())
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools
            .read()
            .map(|t| t.contains_key(name))
            .unwrap_or(false)
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<ToolDefinition>> {
        self.tools.read().ok().and_then(|t| t.get(name).cloned())
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// All tools with their usage counters, sorted by name.
    pub fn get_tool_info(&self) -> Vec<ToolInfo> {
        self.collect_info(|_| true)
    }

    pub fn get_tools_by_category(&self, category: ToolCategory) -> Vec<ToolInfo> {
        self.collect_info(|t| t.category == category)
    }

    fn collect_info(&self, filter: impl Fn(&ToolDefinition) -> bool) -> Vec<ToolInfo> {
        let usage = self.get_usage_stats();
        self.tools
            .read()
            .map(|tools| {
                tools
                    .values()
                    .filter(|t| filter(t))
                    .map(|t| ToolInfo {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        category: t.category,
                        schema: t.schema.clone(),
                        agent_compatibility: t.agent_compatibility.clone(),
                        usage: usage.get(&t.name).cloned().unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Shallow validation: every required parameter must be present and non-null.
    pub fn validate_tool_args(&self, name: &str, args: &Value) -> Result<(), ConductorError> {
        let tool = self
            .get_tool(name)
            .ok_or_else(|| ConductorError::NotFound(format!("Tool '{}' not found", name)))?;
        let missing = tool.schema.missing_required(args);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConductorError::BadRequest(format!(
                "Missing required parameters for '{}': {}",
                name,
                missing.join(", ")
            )))
        }
    }

    /// Execute a tool by name. Never returns an error; failures are encoded
    /// in the returned `ToolResult`.
    pub async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        let started = Instant::now();

        let Some(tool) = self.get_tool(name) else {
            tracing::warn!("[ToolManager] Unknown tool requested: {}", name);
            return ToolResult::error(format!("Tool '{}' not found", name)).with_elapsed(started);
        };

        self.record_usage(name);

        if let Err(e) = self.validate_tool_args(name, &args) {
            tracing::warn!("[ToolManager] {}", e);
            return ToolResult::error(e.to_string()).with_elapsed(started);
        }

        // Panics are caught in place; a caller dropping this future (a timeout)
        // cancels the executor with it.
        let outcome = AssertUnwindSafe(tool.handler.call(args))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(output)) => {
                let mut result = ToolResult::success(output.data);
                result.metadata.tokens_used = output.tokens_used;
                result.metadata.cost = output.cost;
                result
            }
            Ok(Err(e)) => {
                tracing::warn!("[ToolManager] Tool '{}' failed: {}", name, e);
                ToolResult::error(e.to_string())
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::error!("[ToolManager] Tool '{}' panicked: {}", name, reason);
                ToolResult::error(format!("Tool '{}' crashed: {}", name, reason))
            }
        };

        result.with_elapsed(started)
    }

    fn record_usage(&self, name: &str) {
        if let Ok(mut usage) = self.usage.lock() {
            let entry = usage.entry(name.to_string()).or_default();
            entry.count += 1;
            entry.last_used = Some(Utc::now());
        }
    }

    pub fn get_usage_stats(&self) -> HashMap<String, ToolUsage> {
        self.usage.lock().map(|u| u.clone()).unwrap_or_default()
    }

    /// Most used tools first; ties broken by name.
    pub fn get_most_used_tools(&self, limit: usize) -> Vec<(String, ToolUsage)> {
        let mut stats: Vec<(String, ToolUsage)> = self.get_usage_stats().into_iter().collect();
        stats.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(&b.0)));
        stats.truncate(limit);
        stats
    }

    pub fn clear_usage_stats(&self) {
        if let Ok(mut usage) = self.usage.lock() {
            usage.clear();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
