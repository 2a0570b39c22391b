//! Conductor CLI: run agents, tools and workflows from the command line.
//!
//! Wires the same `conductor-core` state a host service would use, with the
//! offline providers unless an `llm` section is configured.

mod commands;

use clap::{Parser, Subcommand};

/// Conductor CLI: agent and tool orchestration
#[derive(Parser)]
#[command(name = "conductor", version, about = "Conductor CLI: agent and tool orchestration")]
pub struct Cli {
    /// Path to a conductor.yaml configuration file
    #[arg(long, env = "CONDUCTOR_CONFIG", global = true)]
    config: Option<String>,

    /// Directory of documents (*.txt, *.md, *.csv) and data sources (*.json)
    #[arg(long, global = true)]
    data_dir: Option<String>,

    /// User id recorded in the request context
    #[arg(long, default_value = "cli-user", global = true)]
    user_id: String,

    /// Context parameter as key=value; the value is parsed as JSON when possible.
    /// Example: --param fileId=q3-report --param cashFlows=[400,400,400]
    #[arg(long = "param", global = true)]
    params: Vec<String>,

    /// Quick prompt mode: route the prompt and run the selected agents.
    /// Example: conductor -p "Summarize the Q3 report"
    #[arg(short = 'p', long = "prompt")]
    prompt: Option<String>,

    /// Routing strategy for prompt mode (keyword | multi-agent)
    #[arg(long)]
    strategy: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and run agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Inspect and run tools
    Tool {
        #[command(subcommand)]
        action: ToolAction,
    },

    /// Show which agents a prompt would be routed to, without running them
    Route {
        /// The prompt to route
        prompt: String,
        /// Routing strategy (defaults to the configured one)
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Run or validate workflow definitions (YAML or JSON)
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// List all agents, including inactive ones
    List,
    /// Show one agent as JSON
    Show {
        /// Agent ID
        id: String,
    },
    /// Run one agent against a prompt
    Run {
        /// Agent ID
        id: String,
        /// The prompt
        prompt: String,
    },
}

#[derive(Subcommand)]
enum ToolAction {
    /// List registered tools
    List {
        /// Only tools of this category (e.g. document, financial)
        #[arg(long)]
        category: Option<String>,
    },
    /// Execute a tool directly with JSON arguments
    Run {
        /// Tool name
        name: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Show usage counters, most used first
    Stats {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Execute a workflow file
    Run {
        /// Path to the workflow file
        file: String,
        /// Workflow id recorded in the run (defaults to the file stem)
        #[arg(long)]
        workflow_id: Option<String>,
        /// Print the full run result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a workflow file without running it
    Validate {
        /// Path to the workflow file
        file: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conductor_core=warn,conductor_cli=info".into()),
        )
        .init();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    if cli.prompt.is_none() && cli.command.is_none() {
        // No prompt and no subcommand: show help
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        println!();
        return Ok(());
    }

    let state = commands::init_state(cli.config.as_deref(), cli.data_dir.as_deref())?;
    let context = commands::build_context(&cli.user_id, &cli.params)?;

    let result = if let Some(prompt_text) = cli.prompt {
        commands::prompt::run(&state, &prompt_text, &context, cli.strategy.as_deref()).await
    } else if let Some(command) = cli.command {
        match command {
            Commands::Agent { action } => match action {
                AgentAction::List => commands::agent::list(&state),
                AgentAction::Show { id } => commands::agent::show(&state, &id),
                AgentAction::Run { id, prompt } => {
                    commands::agent::run(&state, &id, &prompt, &context).await
                }
            },

            Commands::Tool { action } => match action {
                ToolAction::List { category } => commands::tool::list(&state, category.as_deref()),
                ToolAction::Run { name, args } => commands::tool::run(&state, &name, &args).await,
                ToolAction::Stats { limit } => commands::tool::stats(&state, limit),
            },

            Commands::Route { prompt, strategy } => {
                commands::route::run(&state, &prompt, &context, strategy.as_deref()).await
            }

            Commands::Workflow { action } => match action {
                WorkflowAction::Run {
                    file,
                    workflow_id,
                    json,
                } => {
                    commands::workflow::run(&state, &file, workflow_id.as_deref(), &cli.user_id, json)
                        .await
                }
                WorkflowAction::Validate { file } => commands::workflow::validate(&state, &file),
            },
        }
    } else {
        Ok(())
    };

    // Stop the queue worker and deliver queued alerts before the process exits.
    state.shutdown().await;
    result
}
