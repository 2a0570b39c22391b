//! Built-in tools registered at startup.
//!
//! Document tools go through the `DocumentSource`, generation tools through the
//! `LlmProvider`, and `searchDocuments` through the `SearchProvider`. The
//! analysis, financial and product tools are pure computations over their
//! arguments.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{ToolCategory, ToolDefinition, ToolHandler, ToolManager, ToolOutput, ToolSchema};
use crate::error::ConductorError;
use crate::providers::{ChatMessage, ChatOptions, DocumentSource, LlmProvider, SearchProvider};

/// Collaborators shared by the built-in tools.
#[derive(Clone)]
pub struct ToolDeps {
    pub documents: Arc<dyn DocumentSource>,
    pub llm: Arc<dyn LlmProvider>,
    pub search: Arc<dyn SearchProvider>,
}

/// Register every built-in tool on `manager`.
pub fn register_builtin_tools(manager: &ToolManager, deps: &ToolDeps) -> Result<(), ConductorError> {
    for tool in builtin_tools(deps) {
        manager.register_tool(tool)?;
    }
    Ok(())
}

pub fn builtin_tools(deps: &ToolDeps) -> Vec<ToolDefinition> {
    vec![
        summarize_doc(deps),
        extract_tables(deps),
        search_documents(deps),
        analyze_data(deps),
        calculate_financials(),
        prioritize_features(),
        draft_email(deps),
        review_contract(deps),
        generate_job_description(deps),
        create_campaign_brief(deps),
    ]
}

// ─── Argument helpers ────────────────────────────────────────────────────

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ConductorError> {
    str_arg(args, key)
        .ok_or_else(|| ConductorError::BadRequest(format!("'{}' must be a string", key)))
}

fn f64_list(args: &Value, key: &str) -> Result<Vec<f64>, ConductorError> {
    args.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ConductorError::BadRequest(format!("'{}' must be an array", key)))?
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                ConductorError::BadRequest(format!("'{}' must contain only numbers", key))
            })
        })
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ─── Document tools ──────────────────────────────────────────────────────

struct SummarizeDoc {
    documents: Arc<dyn DocumentSource>,
    llm: Arc<dyn LlmProvider>,
}

#[async_trait]
impl ToolHandler for SummarizeDoc {
    async fn call(&self, args: Value) -> Result<ToolOutput, ConductorError> {
        let file_id = require_str(&args, "fileId")?;
        let max_length = args
            .get("maxLength")
            .and_then(Value::as_u64)
            .unwrap_or(500) as usize;
        let text = self.documents.get_document_text_by_id(file_id).await?;
        let summary = self.llm.summarize(&text, max_length).await?;
        Ok(ToolOutput::new(json!({
            "fileId": file_id,
            "summary": summary.content,
            "originalLength": text.chars().count(),
        }))
        .with_tokens(summary.usage.total()))
    }
}

fn summarize_doc(deps: &ToolDeps) -> ToolDefinition {
    ToolDefinition::new(
        "summarizeDoc",
        "Summarize a stored document",
        ToolCategory::Document,
        ToolSchema::object(
            json!({
                "fileId": { "type": "string" },
                "maxLength": { "type": "integer", "default": 500 }
            }),
            &["fileId"],
        ),
        SummarizeDoc {
            documents: deps.documents.clone(),
            llm: deps.llm.clone(),
        },
    )
}

struct ExtractTables {
    documents: Arc<dyn DocumentSource>,
}

#[async_trait]
impl ToolHandler for ExtractTables {
    async fn call(&self, args: Value) -> Result<ToolOutput, ConductorError> {
        let file_id = require_str(&args, "fileId")?;
        let format = str_arg(&args, "format").unwrap_or("csv");
        let rows = self.documents.extract_tables_from_file(file_id, format).await?;
        Ok(ToolOutput::new(json!({
            "fileId": file_id,
            "format": format,
            "rowCount": rows.len(),
            "rows": rows,
        })))
    }
}

fn extract_tables(deps: &ToolDeps) -> ToolDefinition {
    ToolDefinition::new(
        "extractTables",
        "Extract tabular rows from a stored file",
        ToolCategory::Document,
        ToolSchema::object(
            json!({
                "fileId": { "type": "string" },
                "format": { "type": "string", "default": "csv" }
            }),
            &["fileId"],
        ),
        ExtractTables {
            documents: deps.documents.clone(),
        },
    )
}

struct SearchDocuments {
    search: Arc<dyn SearchProvider>,
}

#[async_trait]
impl ToolHandler for SearchDocuments {
    async fn call(&self, args: Value) -> Result<ToolOutput, ConductorError> {
        let user_id = require_str(&args, "userId")?;
        let query = str_arg(&args, "query")
            .or_else(|| str_arg(&args, "prompt"))
            .ok_or_else(|| {
                ConductorError::BadRequest("'query' or 'prompt' is required".to_string())
            })?;
        let k = args.get("k").and_then(Value::as_u64).unwrap_or(5) as usize;
        let hits = self.search.generate_rag_response(query, user_id, k).await?;
        Ok(ToolOutput::new(json!({
            "query": query,
            "results": hits,
        })))
    }
}

fn search_documents(deps: &ToolDeps) -> ToolDefinition {
    ToolDefinition::new(
        "searchDocuments",
        "Retrieve the most relevant document passages for a query",
        ToolCategory::Document,
        ToolSchema::object(
            json!({
                "userId": { "type": "string" },
                "query": { "type": "string", "description": "Defaults to the prompt" },
                "k": { "type": "integer", "default": 5 }
            }),
            &["userId"],
        ),
        SearchDocuments {
            search: deps.search.clone(),
        },
    )
}

// ─── Analysis ────────────────────────────────────────────────────────────

struct AnalyzeData {
    documents: Arc<dyn DocumentSource>,
}

#[async_trait]
impl ToolHandler for AnalyzeData {
    async fn call(&self, args: Value) -> Result<ToolOutput, ConductorError> {
        let source_id = require_str(&args, "sourceId")?;
        let rows = self.documents.get_data_by_source(source_id).await?;
        Ok(ToolOutput::new(json!({
            "sourceId": source_id,
            "rowCount": rows.len(),
            "columns": column_stats(&rows),
        })))
    }
}

fn analyze_data(deps: &ToolDeps) -> ToolDefinition {
    ToolDefinition::new(
        "analyzeData",
        "Descriptive statistics for every numeric column of a data source",
        ToolCategory::Analysis,
        ToolSchema::object(json!({ "sourceId": { "type": "string" } }), &["sourceId"]),
        AnalyzeData {
            documents: deps.documents.clone(),
        },
    )
}

/// count / sum / mean / min / max per numeric column, in first-seen order.
pub fn column_stats(rows: &[Value]) -> Map<String, Value> {
    let mut columns: Vec<(String, Vec<f64>)> = Vec::new();
    for row in rows.iter().filter_map(Value::as_object) {
        for (key, value) in row {
            let Some(n) = value.as_f64() else { continue };
            match columns.iter_mut().find(|(k, _)| k == key) {
                Some((_, values)) => values.push(n),
                None => columns.push((key.clone(), vec![n])),
            }
        }
    }

    columns
        .into_iter()
        .map(|(key, values)| {
            let sum: f64 = values.iter().sum();
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let stats = json!({
                "count": values.len(),
                "sum": round2(sum),
                "mean": round2(sum / values.len() as f64),
                "min": min,
                "max": max,
            });
            (key, stats)
        })
        .collect()
}

// ─── Financial ───────────────────────────────────────────────────────────

async fn run_calculate_financials(args: Value) -> Result<ToolOutput, ConductorError> {
    let cash_flows = f64_list(&args, "cashFlows")?;
    let initial = args
        .get("initialInvestment")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let rate = args.get("discountRate").and_then(Value::as_f64).unwrap_or(0.1);
    Ok(ToolOutput::new(financial_summary(&cash_flows, initial, rate)))
}

fn calculate_financials() -> ToolDefinition {
    ToolDefinition::from_fn(
        "calculateFinancials",
        "NPV, ROI and payback period for a series of yearly cash flows",
        ToolCategory::Financial,
        ToolSchema::object(
            json!({
                "cashFlows": { "type": "array", "items": { "type": "number" } },
                "initialInvestment": { "type": "number", "default": 0 },
                "discountRate": { "type": "number", "default": 0.1 }
            }),
            &["cashFlows"],
        ),
        run_calculate_financials,
    )
    .with_agent_compatibility(&["financial-analyst", "data-analyst", "general-assistant"])
}

pub fn financial_summary(cash_flows: &[f64], initial: f64, rate: f64) -> Value {
    let npv = cash_flows
        .iter()
        .enumerate()
        .map(|(t, cf)| cf / (1.0 + rate).powi(t as i32 + 1))
        .sum::<f64>()
        - initial;

    let total: f64 = cash_flows.iter().sum();
    let roi = (initial > 0.0).then(|| round2((total - initial) / initial * 100.0));

    // Fractional year in which the cumulative inflow covers the investment.
    let mut payback = None;
    let mut cumulative = 0.0;
    for (year, cf) in cash_flows.iter().enumerate() {
        if cumulative + cf >= initial && *cf > 0.0 {
            payback = Some(round2(year as f64 + (initial - cumulative) / cf));
            break;
        }
        cumulative += cf;
    }

    json!({
        "npv": round2(npv),
        "roiPercent": roi,
        "paybackYears": payback,
        "totalInflow": round2(total),
        "discountRate": rate,
    })
}

// ─── Product ─────────────────────────────────────────────────────────────

async fn run_prioritize_features(args: Value) -> Result<ToolOutput, ConductorError> {
    let features = args
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| ConductorError::BadRequest("'features' must be an array".to_string()))?;

    let mut ranked = Vec::with_capacity(features.len());
    for feature in features {
        let name = feature.get("name").and_then(Value::as_str).unwrap_or("unnamed");
        let field = |k: &str| feature.get(k).and_then(Value::as_f64).unwrap_or(0.0);
        let effort = field("effort");
        if effort <= 0.0 {
            return Err(ConductorError::BadRequest(format!(
                "Feature '{}' needs a positive effort",
                name
            )));
        }
        let score = field("reach") * field("impact") * field("confidence") / effort;
        ranked.push((name.to_string(), round2(score)));
    }
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let ranked: Vec<Value> = ranked
        .into_iter()
        .enumerate()
        .map(|(i, (name, score))| json!({ "rank": i + 1, "name": name, "riceScore": score }))
        .collect();
    Ok(ToolOutput::new(json!({ "ranked": ranked })))
}

fn prioritize_features() -> ToolDefinition {
    ToolDefinition::from_fn(
        "prioritizeFeatures",
        "Rank features by RICE score (reach * impact * confidence / effort)",
        ToolCategory::Product,
        ToolSchema::object(
            json!({
                "features": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "reach": { "type": "number" },
                            "impact": { "type": "number" },
                            "confidence": { "type": "number" },
                            "effort": { "type": "number" }
                        }
                    }
                }
            }),
            &["features"],
        ),
        run_prioritize_features,
    )
}

// ─── Generation tools ────────────────────────────────────────────────────

/// Fills a prompt template from the arguments and asks the LLM to write the result.
struct GenerateText {
    llm: Arc<dyn LlmProvider>,
    system: &'static str,
    fields: &'static [&'static str],
}

#[async_trait]
impl ToolHandler for GenerateText {
    async fn call(&self, args: Value) -> Result<ToolOutput, ConductorError> {
        let mut request = require_str(&args, "prompt")?.to_string();
        for field in self.fields {
            if let Some(v) = str_arg(&args, field) {
                request.push_str(&format!("\n{}: {}", field, v));
            }
        }
        let opts = ChatOptions {
            system: Some(self.system.to_string()),
            ..Default::default()
        };
        let completion = self
            .llm
            .chat_completion(&[ChatMessage::user(request)], &opts)
            .await?;
        Ok(ToolOutput::new(json!({ "content": completion.content }))
            .with_tokens(completion.usage.total()))
    }
}

fn generation_tool(
    deps: &ToolDeps,
    name: &str,
    description: &str,
    category: ToolCategory,
    system: &'static str,
    fields: &'static [&'static str],
) -> ToolDefinition {
    let mut properties = Map::new();
    properties.insert("prompt".to_string(), json!({ "type": "string" }));
    for field in fields {
        properties.insert(field.to_string(), json!({ "type": "string" }));
    }

    ToolDefinition::new(
        name,
        description,
        category,
        ToolSchema::object(Value::Object(properties), &["prompt"]),
        GenerateText {
            llm: deps.llm.clone(),
            system,
            fields,
        },
    )
}

fn draft_email(deps: &ToolDeps) -> ToolDefinition {
    generation_tool(
        deps,
        "draftEmail",
        "Draft a professional email",
        ToolCategory::Communication,
        "Email draft\nWrite a concise, professional email for the request below.",
        &["recipient", "subject", "tone"],
    )
}

fn generate_job_description(deps: &ToolDeps) -> ToolDefinition {
    generation_tool(
        deps,
        "generateJobDescription",
        "Write a job description for a role",
        ToolCategory::Hr,
        "Job description\nWrite a structured job description: summary, responsibilities, requirements.",
        &["title", "department", "level"],
    )
}

fn create_campaign_brief(deps: &ToolDeps) -> ToolDefinition {
    generation_tool(
        deps,
        "createCampaignBrief",
        "Create a marketing campaign brief",
        ToolCategory::Marketing,
        "Campaign brief\nOutline objective, audience, channels, messaging and success metrics.",
        &["product", "audience", "budget"],
    )
}

struct ReviewContract {
    documents: Arc<dyn DocumentSource>,
    llm: Arc<dyn LlmProvider>,
}

#[async_trait]
impl ToolHandler for ReviewContract {
    async fn call(&self, args: Value) -> Result<ToolOutput, ConductorError> {
        let file_id = require_str(&args, "fileId")?;
        let mut request = self.documents.get_document_text_by_id(file_id).await?;
        if let Some(focus) = str_arg(&args, "focus") {
            request = format!("Focus: {}\n\n{}", focus, request);
        }
        let opts = ChatOptions {
            system: Some(
                "Contract review\nList obligations, liabilities and unusual clauses.".to_string(),
            ),
            ..Default::default()
        };
        let completion = self
            .llm
            .chat_completion(&[ChatMessage::user(request)], &opts)
            .await?;
        Ok(ToolOutput::new(json!({
            "fileId": file_id,
            "review": completion.content,
        }))
        .with_tokens(completion.usage.total()))
    }
}

fn review_contract(deps: &ToolDeps) -> ToolDefinition {
    ToolDefinition::new(
        "reviewContract",
        "Review a stored contract and flag risky clauses",
        ToolCategory::Legal,
        ToolSchema::object(
            json!({
                "fileId": { "type": "string" },
                "focus": { "type": "string" }
            }),
            &["fileId"],
        ),
        ReviewContract {
            documents: deps.documents.clone(),
            llm: deps.llm.clone(),
        },
    )
    .with_agent_compatibility(&["legal-advisor"])
}
