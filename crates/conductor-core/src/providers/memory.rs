//! In-process collaborator implementations.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{
    approx_tokens, ChatMessage, ChatOptions, Completion, DocumentSource, LlmProvider, SearchHit,
    SearchProvider, TokenUsage,
};
use crate::error::ConductorError;

// ─── Documents ───────────────────────────────────────────────────────────

/// Documents, data sources and pre-extracted tables held in memory.
#[derive(Default)]
pub struct InMemoryDocumentSource {
    documents: RwLock<BTreeMap<String, String>>,
    data_sources: RwLock<BTreeMap<String, Vec<Value>>>,
    tables: RwLock<BTreeMap<String, Vec<Value>>>,
}

impl InMemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_document(&self, file_id: &str, text: &str) {
        if let Ok(mut docs) = self.documents.write() {
            docs.insert(file_id.to_string(), text.to_string());
        }
    }

    pub fn insert_data_source(&self, source_id: &str, rows: Vec<Value>) {
        if let Ok(mut sources) = self.data_sources.write() {
            sources.insert(source_id.to_string(), rows);
        }
    }

    pub fn insert_table(&self, file_id: &str, rows: Vec<Value>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.insert(file_id.to_string(), rows);
        }
    }

    /// Snapshot of all `(file_id, text)` pairs, ordered by id.
    pub fn documents(&self) -> Vec<(String, String)> {
        self.documents
            .read()
            .map(|d| d.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Load a data directory. Text files (`.txt`, `.md`, `.csv`) become
    /// documents keyed by file stem; `.json` arrays become both a data source
    /// and a table under the stem.
    pub fn load_dir(&self, dir: &Path) -> Result<usize, ConductorError> {
        if !dir.is_dir() {
            return Err(ConductorError::NotFound(format!(
                "Data directory '{}' does not exist",
                dir.display()
            )));
        }

        let mut count = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

            match ext {
                "txt" | "md" | "csv" => {
                    let text = std::fs::read_to_string(&path)?;
                    self.insert_document(stem, &text);
                }
                "json" => {
                    let content = std::fs::read_to_string(&path)?;
                    match serde_json::from_str::<Value>(&content)? {
                        Value::Array(rows) => {
                            self.insert_data_source(stem, rows.clone());
                            self.insert_table(stem, rows);
                        }
                        _ => {
                            tracing::warn!(
                                "[Documents] Skipping {}: expected a JSON array",
                                path.display()
                            );
                            continue;
                        }
                    }
                }
                _ => continue,
            }

            tracing::debug!("[Documents] Loaded {}", path.display());
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn get_document_text_by_id(&self, file_id: &str) -> Result<String, ConductorError> {
        self.documents
            .read()
            .ok()
            .and_then(|d| d.get(file_id).cloned())
            .ok_or_else(|| ConductorError::NotFound(format!("Document '{}' not found", file_id)))
    }

    async fn get_data_by_source(&self, source_id: &str) -> Result<Vec<Value>, ConductorError> {
        self.data_sources
            .read()
            .ok()
            .and_then(|d| d.get(source_id).cloned())
            .ok_or_else(|| {
                ConductorError::NotFound(format!("Data source '{}' not found", source_id))
            })
    }

    async fn extract_tables_from_file(
        &self,
        file_id: &str,
        format: &str,
    ) -> Result<Vec<Value>, ConductorError> {
        if let Some(rows) = self.tables.read().ok().and_then(|t| t.get(file_id).cloned()) {
            return Ok(rows);
        }

        let text = self.get_document_text_by_id(file_id).await?;
        match format {
            "csv" => parse_csv(&text),
            other => Err(ConductorError::BadRequest(format!(
                "Cannot extract '{}' tables from document '{}'",
                other, file_id
            ))),
        }
    }
}

/// Plain comma-separated text with a header row. Quoted fields are not supported.
fn parse_csv(text: &str) -> Result<Vec<Value>, ConductorError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| ConductorError::BadRequest("Table is empty".to_string()))?
        .split(',')
        .map(str::trim)
        .collect();

    Ok(lines
        .map(|line| {
            let mut row = Map::new();
            for (key, cell) in header.iter().zip(line.split(',').map(str::trim)) {
                let value = cell
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(cell.to_string()));
                row.insert(key.to_string(), value);
            }
            Value::Object(row)
        })
        .collect())
}

// ─── LLM ─────────────────────────────────────────────────────────────────

/// Offline provider: summaries are the leading sentences of the input, chat
/// replies restate the latest user turn under the system prompt's heading.
#[derive(Default)]
pub struct ExtractiveLlm;

impl ExtractiveLlm {
    pub fn new() -> Self {
        Self
    }

    fn extract(text: &str, max_length: usize) -> String {
        let mut out = String::new();
        for sentence in split_sentences(text) {
            let needed = if out.is_empty() { sentence.len() } else { sentence.len() + 1 };
            if out.chars().count() + needed > max_length {
                break;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(sentence);
        }
        if out.is_empty() {
            out = crate::truncate(text.trim(), max_length);
        }
        out
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            if end == text.len() || bytes[end].is_ascii_whitespace() {
                let s = text[start..end].trim();
                if !s.is_empty() {
                    sentences.push(s);
                }
                start = end;
            }
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

#[async_trait]
impl LlmProvider for ExtractiveLlm {
    async fn summarize(&self, text: &str, max_length: usize) -> Result<Completion, ConductorError> {
        if text.trim().is_empty() {
            return Err(ConductorError::BadRequest("Nothing to summarize".to_string()));
        }
        let content = Self::extract(text, max_length);
        Ok(Completion {
            usage: TokenUsage {
                input_tokens: approx_tokens(text),
                output_tokens: approx_tokens(&content),
            },
            content,
        })
    }

    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<Completion, ConductorError> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .ok_or_else(|| ConductorError::BadRequest("No user message".to_string()))?;

        let body = Self::extract(&last.content, 600);
        let content = match opts
            .system
            .as_deref()
            .and_then(|s| s.lines().map(str::trim).find(|l| !l.is_empty()))
        {
            Some(heading) => format!("{}\n\n{}", heading.trim_start_matches('#').trim(), body),
            None => body,
        };

        let input: u64 = messages.iter().map(|m| approx_tokens(&m.content)).sum();
        Ok(Completion {
            usage: TokenUsage {
                input_tokens: input,
                output_tokens: approx_tokens(&content),
            },
            content,
        })
    }
}

// ─── Search ──────────────────────────────────────────────────────────────

/// Term-overlap ranking over an in-memory document set.
pub struct KeywordSearch {
    documents: Arc<InMemoryDocumentSource>,
}

impl KeywordSearch {
    pub fn new(documents: Arc<InMemoryDocumentSource>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl SearchProvider for KeywordSearch {
    async fn generate_rag_response(
        &self,
        query: &str,
        user_id: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, ConductorError> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
            .map(str::to_string)
            .collect();
        if terms.is_empty() {
            return Err(ConductorError::BadRequest(
                "Search query has no usable terms".to_string(),
            ));
        }

        let mut hits: Vec<SearchHit> = self
            .documents
            .documents()
            .into_iter()
            .filter_map(|(id, text)| {
                let lower = text.to_lowercase();
                let matched = terms.iter().filter(|t| lower.contains(t.as_str())).count();
                if matched == 0 {
                    return None;
                }
                let snippet = split_sentences(&text)
                    .into_iter()
                    .find(|s| {
                        let s = s.to_lowercase();
                        terms.iter().any(|t| s.contains(t.as_str()))
                    })
                    .map(|s| crate::truncate(s, 200))
                    .unwrap_or_default();
                Some(SearchHit {
                    document_id: id,
                    snippet,
                    score: matched as f64 / terms.len() as f64,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        hits.truncate(k);
        tracing::debug!(
            "[Search] {} hit(s) for user {} (query: {})",
            hits.len(),
            user_id,
            crate::truncate(query, 60)
        );
        Ok(hits)
    }
}
