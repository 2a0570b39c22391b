//! External collaborators consumed by the tools: document/data access,
//! text generation and retrieval.
//!
//! Each collaborator is a trait so the host can plug in real services. The
//! in-process implementations in `memory` keep the system runnable offline,
//! and `llm::HttpLlmProvider` talks to an Anthropic-compatible Messages API.

pub mod llm;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConductorError;

pub use llm::HttpLlmProvider;
pub use memory::{ExtractiveLlm, InMemoryDocumentSource, KeywordSearch};

// ─── Documents ───────────────────────────────────────────────────────────

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn get_document_text_by_id(&self, file_id: &str) -> Result<String, ConductorError>;

    async fn get_data_by_source(&self, source_id: &str) -> Result<Vec<Value>, ConductorError>;

    async fn extract_tables_from_file(
        &self,
        file_id: &str,
        format: &str,
    ) -> Result<Vec<Value>, ConductorError>;
}

// ─── LLM ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

/// Non-streaming text generation.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn summarize(&self, text: &str, max_length: usize) -> Result<Completion, ConductorError>;

    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<Completion, ConductorError>;
}

// ─── Retrieval ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub document_id: String,
    pub snippet: String,
    pub score: f64,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn generate_rag_response(
        &self,
        query: &str,
        user_id: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, ConductorError>;
}

/// Rough token estimate used where a provider does not report usage.
pub fn approx_tokens(text: &str) -> u64 {
    (text.chars().count() as u64 + 3) / 4
}
