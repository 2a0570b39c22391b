//! `conductor tool` - list, run and inspect usage of tools.

use conductor_core::state::AppState;
use conductor_core::tools::ToolCategory;
use serde_json::Value;

use super::print_serialized;

pub fn list(state: &AppState, category: Option<&str>) -> Result<(), String> {
    let tools = match category {
        Some(raw) => {
            let category = ToolCategory::from_str(raw)
                .ok_or_else(|| format!("Unknown tool category '{}'", raw))?;
            state.tool_manager.get_tools_by_category(category)
        }
        None => state.tool_manager.get_tool_info(),
    };

    if tools.is_empty() {
        println!("No tools found.");
        return Ok(());
    }

    println!("{:<24} {:<14} {:<22} DESCRIPTION", "NAME", "CATEGORY", "REQUIRED");
    for tool in tools {
        println!(
            "{:<24} {:<14} {:<22} {}",
            tool.name,
            tool.category,
            tool.schema.required.join(","),
            tool.description
        );
    }
    Ok(())
}

pub async fn run(state: &AppState, name: &str, args: &str) -> Result<(), String> {
    let args: Value =
        serde_json::from_str(args).map_err(|e| format!("--args is not valid JSON: {}", e))?;
    if !args.is_object() {
        return Err("--args must be a JSON object".to_string());
    }

    let result = state.tool_manager.execute_tool(name, args).await;
    print_serialized(&result)?;

    if result.success {
        Ok(())
    } else {
        Err(result
            .error
            .unwrap_or_else(|| format!("Tool '{}' failed", name)))
    }
}

pub fn stats(state: &AppState, limit: usize) -> Result<(), String> {
    let stats = state.tool_manager.get_most_used_tools(limit);
    if stats.is_empty() {
        println!("No tool has been used in this process yet.");
        return Ok(());
    }
    for (name, usage) in stats {
        println!(
            "{:<24} {:>6}  {}",
            name,
            usage.count,
            usage
                .last_used
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}
