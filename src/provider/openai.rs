use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::error::{SeedError, SeedResult};
use crate::types::*;

use super::traits::{status_error, Provider};

/// OpenAI-style `chat/completions` adapter for locally hosted models.
///
/// `endpoint` is the full completions URL, e.g.
/// `http://localhost:1234/v1/chat/completions`.
pub struct OpenAIProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAIProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> SeedResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut api_messages = Vec::new();
        if !request.system.is_empty() {
            api_messages.push(json!({"role": "system", "content": request.system}));
        }
        for msg in &request.messages {
            api_messages.extend(self.message_to_api(msg));
        }

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": api_messages,
        });

        if !request.tools.is_empty() {
            let api_tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(api_tools);
        }

        body
    }

    /// One normalized message may expand into several wire messages: a tool
    /// turn becomes one `tool` message per result.
    fn message_to_api(&self, msg: &Message) -> Vec<serde_json::Value> {
        match msg.role {
            Role::Assistant => {
                let mut result = json!({"role": "assistant"});
                let content_text = msg.text_content();
                let tool_calls: Vec<serde_json::Value> = msg
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolCall {
                            id,
                            name,
                            arguments,
                        } => Some(json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": arguments.to_string(),
                            }
                        })),
                        _ => None,
                    })
                    .collect();

                result["content"] = json!(content_text);
                if !tool_calls.is_empty() {
                    result["tool_calls"] = json!(tool_calls);
                }
                vec![result]
            }
            Role::Tool => msg
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolResult {
                        tool_call_id,
                        content,
                        ..
                    } => Some(json!({
                        "role": "tool",
                        "tool_call_id": tool_call_id,
                        "content": content,
                    })),
                    _ => None,
                })
                .collect(),
            Role::User => vec![json!({"role": "user", "content": msg.text_content()})],
            Role::System => vec![json!({"role": "system", "content": msg.text_content()})],
        }
    }

    fn parse_response(&self, data: &serde_json::Value) -> SeedResult<CompletionResponse> {
        let choice = data
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| SeedError::Provider("completion response has no choices".into()))?;
        let message = choice.get("message").cloned().unwrap_or_else(|| json!({}));

        let mut content = Vec::new();
        if let Some(text) = message.get("content").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                content.push(ContentBlock::text(text));
            }
        }
        if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
            for call in calls {
                let function = call.get("function").cloned().unwrap_or_else(|| json!({}));
                let raw_args = function
                    .get("arguments")
                    .and_then(|v| v.as_str())
                    .unwrap_or("{}");
                let arguments = serde_json::from_str(raw_args).unwrap_or_else(|_| json!({}));
                content.push(ContentBlock::tool_call(
                    call.get("id").and_then(|v| v.as_str()).unwrap_or(""),
                    function.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                    arguments,
                ));
            }
        }

        let has_calls = content
            .iter()
            .any(|c| matches!(c, ContentBlock::ToolCall { .. }));
        let stop_reason = match choice.get("finish_reason").and_then(|v| v.as_str()) {
            Some(reason) => StopReason::from_wire(reason),
            None if has_calls => StopReason::ToolUse,
            None => StopReason::EndTurn,
        };

        let mut response = CompletionResponse::new(content, stop_reason);
        response.model = data.get("model").and_then(|v| v.as_str()).map(String::from);
        response.usage = data.get("usage").map(|u| {
            TokenUsage::new(
                u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
                u.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
            )
        });
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    async fn invoke(&self, request: &CompletionRequest) -> SeedResult<CompletionResponse> {
        let body = self.build_body(request);
        debug!(model = %request.model, endpoint = %self.endpoint, "local completion request");

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        let response = builder.json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(&self.kind(), status.as_u16(), &body));
        }

        let data: serde_json::Value = response.json().await?;
        self.parse_response(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAIProvider {
        OpenAIProvider::new("http://localhost:1234/v1/chat/completions", Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn provider_kind_is_openai() {
        assert_eq!(provider().kind(), ProviderKind::OpenAI);
    }

    #[test]
    fn empty_key_is_dropped() {
        assert!(provider().with_api_key("").api_key.is_none());
        assert!(provider().with_api_key("k").api_key.is_some());
    }

    #[test]
    fn system_goes_first() {
        let request = CompletionRequest::new("local", vec![Message::user("hi")], 100)
            .with_system("be brief");
        let body = provider().build_body(&request);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], 100);
    }

    #[test]
    fn tool_turn_expands_per_result() {
        let msg = Message::tool_results(vec![
            ContentBlock::tool_result("c1", "first", false),
            ContentBlock::tool_result("c2", "second", false),
        ]);
        let api = provider().message_to_api(&msg);
        assert_eq!(api.len(), 2);
        assert_eq!(api[0]["role"], "tool");
        assert_eq!(api[1]["tool_call_id"], "c2");
    }

    #[test]
    fn assistant_tool_calls_serialize_arguments() {
        let msg = Message::new(
            Role::Assistant,
            vec![ContentBlock::tool_call("c1", "get_datetime", json!({}))],
        );
        let api = provider().message_to_api(&msg);
        assert_eq!(api[0]["tool_calls"][0]["function"]["name"], "get_datetime");
        assert_eq!(api[0]["tool_calls"][0]["function"]["arguments"], "{}");
    }

    #[test]
    fn parses_tool_call_response() {
        let data = json!({
            "model": "qwen",
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "pscale_list", "arguments": "{\"s\":\"0.1\"}"}
                    }]
                }
            }]
        });
        let response = provider().parse_response(&data).unwrap();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        match &response.content[0] {
            ContentBlock::ToolCall { name, arguments, .. } => {
                assert_eq!(name, "pscale_list");
                assert_eq!(arguments["s"], "0.1");
            }
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[test]
    fn parses_plain_text_response() {
        let data = json!({"choices": [{"finish_reason": "stop", "message": {"content": "hello"}}]});
        let response = provider().parse_response(&data).unwrap();
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(response.text_content(), "hello");
    }

    #[test]
    fn no_choices_is_an_error() {
        assert!(provider().parse_response(&json!({})).is_err());
    }
}
