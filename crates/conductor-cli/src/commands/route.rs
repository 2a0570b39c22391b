//! `conductor route` - show a routing decision without executing it.

use conductor_core::models::AgentContext;
use conductor_core::state::AppState;

pub async fn run(
    state: &AppState,
    prompt: &str,
    context: &AgentContext,
    strategy: Option<&str>,
) -> Result<(), String> {
    let decision = state.orchestrator.route(prompt, context, strategy).await;

    println!(
        "Strategy: {} (default: {}; available: {})",
        decision.strategy,
        state.orchestrator.default_strategy(),
        state.orchestrator.strategy_names().join(", ")
    );
    for id in &decision.agent_ids {
        match state.agent_registry.get_agent(id) {
            Some(agent) => println!("  → {} ({})", agent.id, agent.name),
            None => println!("  → {} (not registered)", id),
        }
    }
    Ok(())
}
