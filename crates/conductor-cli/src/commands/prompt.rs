//! `conductor -p "prompt"` - route a prompt and run the selected agents.

use conductor_core::models::AgentContext;
use conductor_core::state::AppState;

pub async fn run(
    state: &AppState,
    prompt: &str,
    context: &AgentContext,
    strategy: Option<&str>,
) -> Result<(), String> {
    let result = state.pipeline.execute(prompt, context, strategy).await;

    println!("{}", result.response);
    println!();
    println!(
        "Agents: {} | strategy: {} | {}ms",
        result.metadata.agents_used.join(", "),
        result.metadata.strategy.as_deref().unwrap_or("-"),
        result.metadata.total_execution_time_ms
    );

    if result.success {
        Ok(())
    } else {
        Err(format!(
            "No agent completed the request: {}",
            result.metadata.errors.join("; ")
        ))
    }
}
