use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::error::{SeedError, SeedResult};
use crate::types::*;

use super::traits::{status_error, Provider};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Hosted messages API adapter
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> SeedResult<Self> {
        Self::with_base_url(ANTHROPIC_BASE_URL, api_key, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> SeedResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn build_messages_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let api_messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| self.message_to_api(m))
            .collect();

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": api_messages,
        });

        if !request.system.is_empty() {
            body["system"] = json!(request.system);
        }

        if !request.tools.is_empty() {
            let api_tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = json!(api_tools);
        }

        if let Some(budget) = request.thinking_budget {
            body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
        }

        body
    }

    fn message_to_api(&self, msg: &Message) -> serde_json::Value {
        let role = match msg.role {
            Role::Assistant => "assistant",
            // Tool results travel inside a user turn
            Role::User | Role::Tool | Role::System => "user",
        };

        let content: Vec<serde_json::Value> = msg
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(json!({"type": "text", "text": text})),
                ContentBlock::ToolCall {
                    id,
                    name,
                    arguments,
                } => Some(json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": arguments,
                })),
                ContentBlock::ToolResult {
                    tool_call_id,
                    content,
                    is_error,
                } => Some(json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": content,
                    "is_error": is_error,
                })),
                // Unsigned thinking cannot be replayed
                ContentBlock::Thinking { text, signature } => signature.as_ref().map(|sig| {
                    json!({"type": "thinking", "thinking": text, "signature": sig})
                }),
            })
            .collect();

        json!({
            "role": role,
            "content": content,
        })
    }

    fn parse_response(&self, data: &serde_json::Value) -> SeedResult<CompletionResponse> {
        let blocks = data
            .get("content")
            .and_then(|v| v.as_array())
            .ok_or_else(|| SeedError::Provider("anthropic response has no content array".into()))?;

        let content = blocks
            .iter()
            .filter_map(|block| {
                let str_field = |key: &str| {
                    block
                        .get(key)
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string()
                };
                match block.get("type").and_then(|v| v.as_str()).unwrap_or("") {
                    "text" => Some(ContentBlock::text(str_field("text"))),
                    "tool_use" => Some(ContentBlock::tool_call(
                        str_field("id"),
                        str_field("name"),
                        block.get("input").cloned().unwrap_or_else(|| json!({})),
                    )),
                    "thinking" => Some(ContentBlock::Thinking {
                        text: str_field("thinking"),
                        signature: block
                            .get("signature")
                            .and_then(|v| v.as_str())
                            .map(String::from),
                    }),
                    _ => None,
                }
            })
            .collect();

        let stop_reason = StopReason::from_wire(
            data.get("stop_reason")
                .and_then(|v| v.as_str())
                .unwrap_or("end_turn"),
        );

        let mut response = CompletionResponse::new(content, stop_reason);
        response.model = data.get("model").and_then(|v| v.as_str()).map(String::from);
        response.usage = data.get("usage").map(|u| {
            TokenUsage::new(
                u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
                u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
            )
        });
        Ok(response)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn invoke(&self, request: &CompletionRequest) -> SeedResult<CompletionResponse> {
        let body = self.build_messages_body(request);
        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %request.model, messages = request.messages.len(), "anthropic request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(&self.kind(), status.as_u16(), &body));
        }

        let data: serde_json::Value = response.json().await?;
        self.parse_response(&data)
    }
}
