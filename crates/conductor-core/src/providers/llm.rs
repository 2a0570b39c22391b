//! HTTP LLM provider for Anthropic-compatible Messages APIs.
//!
//! POST {base_url}/v1/messages
//! Headers:
//!   x-api-key: {api_key}
//!   anthropic-version: 2023-06-01
//!   content-type: application/json

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{ChatMessage, ChatOptions, Completion, LlmProvider, TokenUsage};
use crate::config::LlmSettings;
use crate::error::ConductorError;

pub struct HttpLlmProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl HttpLlmProvider {
    pub fn new(settings: &LlmSettings) -> Result<Self, ConductorError> {
        if settings.api_key.is_empty() {
            return Err(ConductorError::BadRequest(
                "LLM api_key is empty. Set it in the config or via ${ANTHROPIC_API_KEY}."
                    .to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
        })
    }

    fn build_body(&self, messages: &[ChatMessage], opts: &ChatOptions) -> Value {
        // The Messages API takes the system prompt separately.
        let mut system: Vec<&str> = opts.system.iter().map(String::as_str).collect();
        let turns: Vec<Value> = messages
            .iter()
            .filter_map(|m| {
                if m.role == "system" {
                    system.push(&m.content);
                    None
                } else {
                    Some(serde_json::json!({ "role": m.role, "content": m.content }))
                }
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": opts.max_tokens.unwrap_or(self.max_tokens),
            "messages": turns,
        });
        if !system.is_empty() {
            body["system"] = Value::String(system.join("\n\n"));
        }
        if let Some(temp) = opts.temperature.and_then(serde_json::Number::from_f64) {
            body["temperature"] = Value::Number(temp);
        }
        body
    }
}

/// Concatenate the text blocks of a Messages API response.
fn parse_response(json: &Value) -> Completion {
    let content = json
        .get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    let usage = json
        .get("usage")
        .map(|u| TokenUsage {
            input_tokens: u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            output_tokens: u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        })
        .unwrap_or_default();

    Completion { content, usage }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn summarize(&self, text: &str, max_length: usize) -> Result<Completion, ConductorError> {
        let prompt = format!(
            "Summarize the following text in at most {} characters. Reply with the summary only.\n\n{}",
            max_length, text
        );
        self.chat_completion(&[ChatMessage::user(prompt)], &ChatOptions::default())
            .await
    }

    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<Completion, ConductorError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(messages, opts);

        tracing::info!("[LLM] Calling Messages API: {} (model: {})", url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ConductorError::Provider(format!(
                "API returned {}: {}",
                status,
                crate::truncate(&text, 300)
            )));
        }

        let json: Value = serde_json::from_str(&text)?;
        Ok(parse_response(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LlmSettings {
        LlmSettings {
            api_key: "test-key".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let err = HttpLlmProvider::new(&LlmSettings::default()).err().unwrap();
        assert!(matches!(err, ConductorError::BadRequest(_)));
    }

    #[test]
    fn system_messages_are_lifted_out_of_turns() {
        let provider = HttpLlmProvider::new(&settings()).unwrap();
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: "Be brief.".to_string(),
            },
            ChatMessage::user("Hello"),
        ];
        let opts = ChatOptions {
            system: Some("You are a legal advisor.".to_string()),
            ..Default::default()
        };
        let body = provider.build_body(&messages, &opts);
        assert_eq!(body["system"], "You are a legal advisor.\n\nBe brief.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn parses_text_blocks_and_usage() {
        let json = serde_json::json!({
            "content": [
                { "type": "text", "text": "one" },
                { "type": "tool_use", "id": "x" },
                { "type": "text", "text": "two" }
            ],
            "usage": { "input_tokens": 12, "output_tokens": 3 }
        });
        let completion = parse_response(&json);
        assert_eq!(completion.content, "one\ntwo");
        assert_eq!(completion.usage.total(), 15);
    }
}
