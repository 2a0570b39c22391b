use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A capability an agent claims to support. Used for routing lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    pub name: String,
    pub category: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Capability {
    pub fn new(name: &str, category: &str) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            enabled: true,
        }
    }
}

/// Per-agent execution limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default = "default_max_tools")]
    pub max_tools_per_request: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retention_days")]
    pub memory_retention_days: u32,
    #[serde(default)]
    pub allowed_file_types: Vec<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size_mb: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tools_per_request: default_max_tools(),
            timeout_ms: default_timeout_ms(),
            memory_retention_days: default_retention_days(),
            allowed_file_types: Vec::new(),
            max_file_size_mb: default_max_file_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_tools() -> usize {
    5
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retention_days() -> u32 {
    30
}

fn default_max_file_size() -> u64 {
    10
}

/// A named role with an allow-list of tools and declared capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub tools_allowed: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub config: AgentConfig,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: &str, name: &str, role: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            system_prompt: String::new(),
            tools_allowed: Vec::new(),
            capabilities: Vec::new(),
            config: AgentConfig::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools_allowed = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    pub fn allows_tool(&self, tool_name: &str) -> bool {
        self.tools_allowed.iter().any(|t| t == tool_name)
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.enabled && c.name == name)
    }

    /// Parse an agent definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, crate::error::ConductorError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// Partial update for `AgentRegistry::update_agent`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub role: Option<String>,
    pub system_prompt: Option<String>,
    pub tools_allowed: Option<Vec<String>>,
    pub capabilities: Option<Vec<Capability>>,
    pub config: Option<AgentConfig>,
    pub is_active: Option<bool>,
}

impl AgentUpdate {
    pub(crate) fn apply(self, agent: &mut Agent) {
        if let Some(name) = self.name {
            agent.name = name;
        }
        if let Some(role) = self.role {
            agent.role = role;
        }
        if let Some(prompt) = self.system_prompt {
            agent.system_prompt = prompt;
        }
        if let Some(tools) = self.tools_allowed {
            agent.tools_allowed = tools;
        }
        if let Some(caps) = self.capabilities {
            agent.capabilities = caps;
        }
        if let Some(config) = self.config {
            agent.config = config;
        }
        if let Some(active) = self.is_active {
            agent.is_active = active;
        }
        agent.updated_at = Utc::now();
    }
}
