//! `conductor agent` - inspect and run agents.

use conductor_core::models::AgentContext;
use conductor_core::state::AppState;

use super::print_serialized;

pub fn list(state: &AppState) -> Result<(), String> {
    let agents = state.agent_registry.list_agents();
    if agents.is_empty() {
        println!("No agents registered.");
        return Ok(());
    }

    println!("{:<22} {:<24} {:<12} {:<7} TOOLS", "ID", "NAME", "ROLE", "ACTIVE");
    for agent in agents {
        println!(
            "{:<22} {:<24} {:<12} {:<7} {}",
            agent.id,
            agent.name,
            agent.role,
            if agent.is_active { "yes" } else { "no" },
            agent.tools_allowed.join(", ")
        );
    }
    Ok(())
}

pub fn show(state: &AppState, agent_id: &str) -> Result<(), String> {
    let agent = state
        .agent_registry
        .get_agent(agent_id)
        .ok_or_else(|| format!("Agent '{}' not found", agent_id))?;
    print_serialized(&agent)
}

pub async fn run(
    state: &AppState,
    agent_id: &str,
    prompt: &str,
    context: &AgentContext,
) -> Result<(), String> {
    let result = state.execute_agent(agent_id, prompt, context).await;

    println!("── {} ({}ms) ──", result.agent_name, result.execution_time_ms);
    println!("{}", result.response);
    if !result.tool_calls.is_empty() {
        println!();
        println!("Tools used: {}", result.tools_used().join(", "));
    }

    if result.success {
        Ok(())
    } else {
        Err(result
            .error
            .unwrap_or_else(|| format!("Agent '{}' failed", agent_id)))
    }
}
