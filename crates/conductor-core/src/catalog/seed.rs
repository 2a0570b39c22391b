use crate::models::{Agent, AgentConfig, Capability};

/// Id of the generalist every routing strategy can fall back to.
pub const GENERALIST_AGENT_ID: &str = "general-assistant";

/// The fixed agent list registered at startup.
pub fn seed_agents() -> Vec<Agent> {
    vec![
        Agent::new(GENERALIST_AGENT_ID, "General Assistant", "generalist")
            .with_system_prompt(GENERAL_SYSTEM_PROMPT)
            .with_tools(&[
                "summarizeDoc",
                "extractTables",
                "searchDocuments",
                "analyzeData",
                "draftEmail",
            ])
            .with_capabilities(vec![
                Capability::new("general-assistance", "utility"),
                Capability::new("document-processing", "document"),
                Capability::new("search", "document"),
            ]),
        Agent::new("financial-analyst", "Financial Analyst", "financial")
            .with_system_prompt(FINANCIAL_SYSTEM_PROMPT)
            .with_tools(&[
                "calculateFinancials",
                "analyzeData",
                "summarizeDoc",
                "extractTables",
            ])
            .with_capabilities(vec![
                Capability::new("financial-analysis", "financial"),
                Capability::new("investment-analysis", "financial"),
                Capability::new("budgeting", "financial"),
            ]),
        Agent::new("hr-specialist", "HR Specialist", "hr")
            .with_system_prompt(HR_SYSTEM_PROMPT)
            .with_tools(&[
                "generateJobDescription",
                "draftEmail",
                "summarizeDoc",
                "searchDocuments",
            ])
            .with_capabilities(vec![
                Capability::new("recruitment", "hr"),
                Capability::new("policy-review", "hr"),
            ]),
        {
            let mut agent = Agent::new("legal-advisor", "Legal Advisor", "legal")
                .with_system_prompt(LEGAL_SYSTEM_PROMPT)
                .with_tools(&["reviewContract", "summarizeDoc", "searchDocuments"])
                .with_capabilities(vec![
                    Capability::new("contract-review", "legal"),
                    Capability::new("compliance", "legal"),
                ]);
            agent.config = AgentConfig {
                allowed_file_types: vec!["pdf".to_string(), "docx".to_string(), "txt".to_string()],
                memory_retention_days: 90,
                ..AgentConfig::default()
            };
            agent
        },
        Agent::new("marketing-strategist", "Marketing Strategist", "marketing")
            .with_system_prompt(MARKETING_SYSTEM_PROMPT)
            .with_tools(&["createCampaignBrief", "draftEmail", "analyzeData"])
            .with_capabilities(vec![
                Capability::new("campaign-planning", "marketing"),
                Capability::new("content-strategy", "marketing"),
            ]),
        Agent::new("product-manager", "Product Manager", "product")
            .with_system_prompt(PRODUCT_SYSTEM_PROMPT)
            .with_tools(&["prioritizeFeatures", "summarizeDoc", "analyzeData"])
            .with_capabilities(vec![
                Capability::new("feature-prioritization", "product"),
                Capability::new("roadmap-planning", "product"),
            ]),
        {
            let mut agent = Agent::new("data-analyst", "Data Analyst", "data")
                .with_system_prompt(DATA_SYSTEM_PROMPT)
                .with_tools(&[
                    "analyzeData",
                    "extractTables",
                    "searchDocuments",
                    "calculateFinancials",
                ])
                .with_capabilities(vec![
                    Capability::new("data-analysis", "analysis"),
                    Capability::new("reporting", "analysis"),
                ]);
            agent.config.allowed_file_types =
                vec!["csv".to_string(), "json".to_string(), "xlsx".to_string()];
            agent.config.max_file_size_mb = 50;
            agent
        },
    ]
}

// ─── System Prompts ───────────────────────────────────────────────────────

const GENERAL_SYSTEM_PROMPT: &str = r#"## General Assistant

Help with everyday requests: summarize documents, find information, pull tables
out of files and draft short messages. Hand domain questions to a specialist
when one is better suited.
"#;

const FINANCIAL_SYSTEM_PROMPT: &str = r#"## Financial Analyst

Evaluate investments, budgets and cash flows. Always state the assumptions
(discount rate, horizon) behind any figure you report.
"#;

const HR_SYSTEM_PROMPT: &str = r#"## HR Specialist

Support hiring and people operations: job descriptions, candidate
communication and policy questions. Keep language inclusive.
"#;

const LEGAL_SYSTEM_PROMPT: &str = r#"## Legal Advisor

Review contracts and compliance questions. Flag risk clearly and note that the
output is not a substitute for counsel.
"#;

const MARKETING_SYSTEM_PROMPT: &str = r#"## Marketing Strategist

Plan campaigns and messaging. Tie every recommendation to an audience and a
measurable goal.
"#;

const PRODUCT_SYSTEM_PROMPT: &str = r#"## Product Manager

Prioritize features and shape roadmaps. Prefer explicit scoring over opinion.
"#;

const DATA_SYSTEM_PROMPT: &str = r#"## Data Analyst

Describe datasets, compute statistics and surface trends. Report sample sizes
alongside every aggregate.
"#;
