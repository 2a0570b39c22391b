//! Agent registry.
//!
//! Agents keep their registration order, which is the order every listing
//! returns. Agents are never removed, only deactivated.

mod seed;

use std::path::Path;
use std::sync::RwLock;

use crate::error::ConductorError;
use crate::models::{Agent, AgentUpdate};
use crate::tools::ToolManager;

pub use seed::{seed_agents, GENERALIST_AGENT_ID};

pub struct AgentRegistry {
    agents: RwLock<Vec<Agent>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
        }
    }

    /// Registry pre-populated with the built-in agents.
    pub fn with_seed_agents() -> Self {
        let registry = Self::new();
        for agent in seed_agents() {
            registry.register_agent(agent);
        }
        registry
    }

    /// Insert or replace an agent by id.
    pub fn register_agent(&self, agent: Agent) {
        let Ok(mut agents) = self.agents.write() else {
            return;
        };
        tracing::info!(
            "[AgentRegistry] Registered agent: {} ({}, {} tools)",
            agent.id,
            agent.role,
            agent.tools_allowed.len()
        );
        match agents.iter_mut().find(|a| a.id == agent.id) {
            Some(existing) => *existing = agent,
            None => agents.push(agent),
        }
    }

    pub fn get_agent(&self, id: &str) -> Option<Agent> {
        self.agents
            .read()
            .ok()
            .and_then(|a| a.iter().find(|a| a.id == id).cloned())
    }

    /// Every registered agent, including inactive ones.
    pub fn list_agents(&self) -> Vec<Agent> {
        self.agents.read().map(|a| a.clone()).unwrap_or_default()
    }

    fn active_where(&self, pred: impl Fn(&Agent) -> bool) -> Vec<Agent> {
        self.agents
            .read()
            .map(|agents| {
                agents
                    .iter()
                    .filter(|a| a.is_active && pred(a))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_all_agents(&self) -> Vec<Agent> {
        self.active_where(|_| true)
    }

    pub fn get_agents_by_capability(&self, capability: &str) -> Vec<Agent> {
        self.active_where(|a| a.has_capability(capability))
    }

    pub fn get_agents_by_role(&self, role: &str) -> Vec<Agent> {
        self.active_where(|a| a.role.eq_ignore_ascii_case(role))
    }

    /// Merge `update` into the agent. Returns false when the id is unknown.
    pub fn update_agent(&self, id: &str, update: AgentUpdate) -> bool {
        let Ok(mut agents) = self.agents.write() else {
            return false;
        };
        let Some(agent) = agents.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        update.apply(agent);
        tracing::info!("[AgentRegistry] Updated agent: {}", id);
        true
    }

    pub fn deactivate_agent(&self, id: &str) -> bool {
        let updated = self.update_agent(
            id,
            AgentUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        );
        if updated {
            tracing::info!("[AgentRegistry] Deactivated agent: {}", id);
        }
        updated
    }

    pub fn can_agent_use_tool(&self, agent_id: &str, tool_name: &str) -> bool {
        self.agents
            .read()
            .map(|agents| {
                agents
                    .iter()
                    .any(|a| a.id == agent_id && a.allows_tool(tool_name))
            })
            .unwrap_or(false)
    }

    /// `(agent_id, tool_name)` pairs whose tool is not registered on `tools`.
    pub fn dangling_tool_refs(&self, tools: &ToolManager) -> Vec<(String, String)> {
        self.list_agents()
            .into_iter()
            .flat_map(|agent| {
                agent
                    .tools_allowed
                    .into_iter()
                    .filter(|t| !tools.has_tool(t))
                    .map(move |t| (agent.id.clone(), t))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Load agent definitions (one per `.yaml`/`.yml` file) and upsert them.
    pub fn load_dir(&self, dir: &Path) -> Result<usize, ConductorError> {
        if !dir.is_dir() {
            return Err(ConductorError::NotFound(format!(
                "Agent directory '{}' does not exist",
                dir.display()
            )));
        }

        let mut count = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !matches!(ext, "yaml" | "yml") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let agent = Agent::from_yaml(&content).map_err(|e| {
                ConductorError::BadRequest(format!("{}: {}", path.display(), e))
            })?;
            self.register_agent(agent);
            count += 1;
        }
        Ok(count)
    }
}
