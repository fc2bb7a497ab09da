use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Message Types ──────────────────────────────────────────────────────────

/// Role in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A content block within a message or a backend response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    Thinking {
        text: String,
        /// Hosted backends require the signature to be echoed back on tool rounds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        ContentBlock::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        ContentBlock::ToolResult {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error,
        }
    }

    pub fn thinking(s: impl Into<String>) -> Self {
        ContentBlock::Thinking {
            text: s.into(),
            signature: None,
        }
    }
}

/// Concatenate the text blocks of a content list, one block per line
fn joined_text(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|c| match c {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
            model: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::text(text)])
    }

    /// A single tool-role turn carrying every result of one round
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self::new(Role::Tool, results)
    }

    /// Extract tool calls from this message
    pub fn tool_calls(&self) -> Vec<&ContentBlock> {
        self.content
            .iter()
            .filter(|c| matches!(c, ContentBlock::ToolCall { .. }))
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.content
            .iter()
            .any(|c| matches!(c, ContentBlock::ToolCall { .. }))
    }

    /// Get text content, blocks joined by newlines
    pub fn text_content(&self) -> String {
        joined_text(&self.content)
    }
}

// ─── Token Usage ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn new(input: usize, output: usize) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
        }
    }

    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    /// Add one response's usage to a running total
    pub fn record(&mut self, usage: &TokenUsage) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
    }
}

// ─── Providers ───────────────────────────────────────────────────────────────

/// Known backend families
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
    Custom(String),
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenAI => write!(f, "openai"),
            ProviderKind::Custom(s) => write!(f, "{s}"),
        }
    }
}

/// Why the backend stopped generating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    /// The backend is waiting on tool results
    ToolUse,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    /// Map a wire-level stop/finish reason onto the normalized set
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "end_turn" | "stop" => StopReason::EndTurn,
            "tool_use" | "tool_calls" | "function_call" => StopReason::ToolUse,
            "max_tokens" | "length" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            other => StopReason::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
            StopReason::Other(s) => s,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized request handed to any backend adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    #[serde(default)]
    pub system: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: usize,
    /// Extended-thinking budget; ignored by backends without thinking support
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<usize>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, max_tokens: usize) -> Self {
        Self {
            model: model.into(),
            system: String::new(),
            messages,
            tools: Vec::new(),
            max_tokens,
            thinking_budget: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_thinking(mut self, budget: Option<usize>) -> Self {
        self.thinking_budget = budget;
        self
    }
}

/// Normalized backend response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    pub fn new(content: Vec<ContentBlock>, stop_reason: StopReason) -> Self {
        Self {
            content,
            stop_reason,
            model: None,
            usage: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![ContentBlock::text(text)], StopReason::EndTurn)
    }

    pub fn tool_calls(&self) -> Vec<&ContentBlock> {
        self.content
            .iter()
            .filter(|c| matches!(c, ContentBlock::ToolCall { .. }))
            .collect()
    }

    /// Text blocks joined by newlines
    pub fn text_content(&self) -> String {
        joined_text(&self.content)
    }

    /// The assistant turn that proposed this response's content
    pub fn to_message(&self) -> Message {
        let mut msg = Message::new(Role::Assistant, self.content.clone());
        msg.model = self.model.clone();
        msg
    }
}

// ─── Tool Definition ─────────────────────────────────────────────────────────

/// Schema for a tool's input parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Message Tests ──────────────────────────────────────────────────

    #[test]
    fn message_user_creates_text() {
        let msg = Message::user("hello world");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text_content(), "hello world");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn message_with_tool_calls() {
        let msg = Message::new(
            Role::Assistant,
            vec![
                ContentBlock::text("Let me look"),
                ContentBlock::tool_call("tc_1", "pscale_read", serde_json::json!({"s": "0.1"})),
                ContentBlock::tool_call("tc_2", "memory_list", serde_json::json!({})),
            ],
        );
        assert!(msg.has_tool_calls());
        assert_eq!(msg.tool_calls().len(), 2);
        assert_eq!(msg.text_content(), "Let me look");
    }

    #[test]
    fn tool_results_message_keeps_every_block() {
        let msg = Message::tool_results(vec![
            ContentBlock::tool_result("a", "one", false),
            ContentBlock::tool_result("b", "two", true),
        ]);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.content.len(), 2);
        assert!(!msg.has_tool_calls());
    }

    // ─── Serialization Tests ────────────────────────────────────────────

    #[test]
    fn content_block_serializes_tagged() {
        let block = ContentBlock::text("hello");
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(r#""type":"text""#));

        let block = ContentBlock::tool_call("id1", "get_datetime", serde_json::json!({}));
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"get_datetime""#));
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, r#""assistant""#);
    }

    // ─── Stop Reason Tests ──────────────────────────────────────────────

    #[test]
    fn stop_reason_maps_both_wire_dialects() {
        assert_eq!(StopReason::from_wire("tool_use"), StopReason::ToolUse);
        assert_eq!(StopReason::from_wire("tool_calls"), StopReason::ToolUse);
        assert_eq!(StopReason::from_wire("stop"), StopReason::EndTurn);
        assert_eq!(StopReason::from_wire("length"), StopReason::MaxTokens);
        assert_eq!(
            StopReason::from_wire("refusal"),
            StopReason::Other("refusal".into())
        );
    }

    #[test]
    fn stop_reason_display() {
        assert_eq!(StopReason::ToolUse.to_string(), "tool_use");
        assert_eq!(StopReason::Other("pause".into()).to_string(), "pause");
    }

    // ─── Response Tests ─────────────────────────────────────────────────

    #[test]
    fn response_text_joins_blocks() {
        let resp = CompletionResponse::new(
            vec![
                ContentBlock::thinking("hmm"),
                ContentBlock::text("first"),
                ContentBlock::text("second"),
            ],
            StopReason::EndTurn,
        );
        assert_eq!(resp.text_content(), "first\nsecond");
        assert!(resp.tool_calls().is_empty());
    }

    #[test]
    fn response_to_message_is_assistant() {
        let mut resp = CompletionResponse::text("done");
        resp.model = Some("m1".into());
        let msg = resp.to_message();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.model.as_deref(), Some("m1"));
    }

    #[test]
    fn provider_kind_display() {
        assert_eq!(ProviderKind::Anthropic.to_string(), "anthropic");
        assert_eq!(ProviderKind::Custom("ollama".into()).to_string(), "ollama");
    }

    #[test]
    fn token_usage_total() {
        assert_eq!(TokenUsage::new(100, 50).total(), 150);
        let mut running = TokenUsage::default();
        running.record(&TokenUsage::new(100, 50));
        running.record(&TokenUsage::new(7, 3));
        assert_eq!(running, TokenUsage::new(107, 53));
    }
}
