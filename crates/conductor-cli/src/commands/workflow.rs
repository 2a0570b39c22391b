//! `conductor workflow` - run and validate workflow files.

use std::path::Path;

use conductor_core::state::AppState;
use conductor_core::workflow::{ExecuteWorkflowRequest, StepStatus, WorkflowConfig};

use super::print_serialized;

fn load(file: &str) -> Result<WorkflowConfig, String> {
    WorkflowConfig::from_file(Path::new(file)).map_err(|e| e.to_string())
}

/// Execute a workflow file and print one line per step attempt.
pub async fn run(
    state: &AppState,
    file: &str,
    workflow_id: Option<&str>,
    user_id: &str,
    json: bool,
) -> Result<(), String> {
    let workflow = load(file)?;
    let workflow_id = workflow_id
        .map(str::to_string)
        .or_else(|| {
            Path::new(file)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
        })
        .unwrap_or_else(|| "workflow".to_string());

    println!(
        "Loaded workflow: {} ({} step(s))",
        workflow.name.as_deref().unwrap_or(&workflow_id),
        workflow.steps.len()
    );

    let result = state
        .execute_workflow(ExecuteWorkflowRequest {
            workflow_config: workflow,
            user_id: user_id.to_string(),
            workflow_id,
        })
        .await;

    if json {
        print_serialized(&result)?;
    } else {
        println!("Run {}", result.run_id);
        for log in &result.logs {
            let marker = match log.status {
                StepStatus::Success => "✓",
                StepStatus::Fail => "✗",
                StepStatus::Skipped => "-",
                StepStatus::Pending | StepStatus::Running => "…",
            };
            print!("  {} {} [{}]", marker, log.step_id, log.agent_id);
            if log.retries > 0 {
                print!(" retry {}", log.retries);
            }
            match &log.error {
                Some(e) => println!(": {}", e),
                None => println!(),
            }
        }
    }

    if result.success {
        println!("Workflow completed successfully.");
        Ok(())
    } else {
        Err(format!(
            "Workflow failed: {}",
            result.error.unwrap_or_else(|| "unknown error".to_string())
        ))
    }
}

/// Validate a workflow file against the graph rules and the live catalog.
pub fn validate(state: &AppState, file: &str) -> Result<(), String> {
    let workflow = load(file)?;
    let problems = state.validate_workflow(&workflow);
    if problems.is_empty() {
        println!("✓ {} is valid ({} step(s))", file, workflow.steps.len());
        return Ok(());
    }
    for problem in &problems {
        println!("✗ {}", problem);
    }
    Err(format!("{} problem(s) found in {}", problems.len(), file))
}
