//! Bounded tool-orchestration loop.
//!
//! One round is one backend invocation. While the backend stops for tool use
//! and the round cap is not reached, every requested call is executed in
//! order, and the assistant turn plus a single tool turn carrying all results
//! are appended before the next invocation.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::SeedResult;
use crate::executor::{status_label, ToolExecutor};
use crate::provider::Provider;
use crate::types::*;

/// Per-run parameters
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub model: String,
    pub system: String,
    pub max_tokens: usize,
    pub thinking_budget: Option<usize>,
    /// Maximum backend invocations, at least 1
    pub round_cap: usize,
}

/// Result of a finished loop
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The last backend response
    pub response: CompletionResponse,
    /// Full conversation including appended assistant and tool turns
    pub messages: Vec<Message>,
    /// Backend invocations performed
    pub rounds: usize,
    /// Tokens summed over every invocation that reported usage
    pub usage: TokenUsage,
}

pub struct ToolLoop {
    provider: Arc<dyn Provider>,
    executor: Arc<dyn ToolExecutor>,
    config: LoopConfig,
    status_tx: Option<mpsc::UnboundedSender<String>>,
}

impl ToolLoop {
    pub fn new(provider: Arc<dyn Provider>, executor: Arc<dyn ToolExecutor>, config: LoopConfig) -> Self {
        Self {
            provider,
            executor,
            config,
            status_tx: None,
        }
    }

    /// Receive a progress line before each tool and each re-invocation
    pub fn with_status(mut self, status_tx: mpsc::UnboundedSender<String>) -> Self {
        self.status_tx = Some(status_tx);
        self
    }

    fn status(&self, line: String) {
        if let Some(tx) = &self.status_tx {
            // Nobody listening is fine
            let _ = tx.send(line);
        }
    }

    fn request(&self, messages: &[Message]) -> CompletionRequest {
        CompletionRequest::new(self.config.model.clone(), messages.to_vec(), self.config.max_tokens)
            .with_system(self.config.system.clone())
            .with_tools(self.executor.definitions())
            .with_thinking(self.config.thinking_budget)
    }

    pub async fn run(&self, initial_messages: Vec<Message>) -> SeedResult<LoopOutcome> {
        let cap = self.config.round_cap.max(1);
        let mut messages = initial_messages;
        let mut round = 1;
        let mut usage = TokenUsage::default();
        let mut response = self.provider.invoke(&self.request(&messages)).await?;

        loop {
            if let Some(reported) = &response.usage {
                usage.record(reported);
            }

            let calls: Vec<(String, String, serde_json::Value)> = response
                .tool_calls()
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolCall {
                        id,
                        name,
                        arguments,
                    } => Some((id.clone(), name.clone(), arguments.clone())),
                    _ => None,
                })
                .collect();

            if response.stop_reason != StopReason::ToolUse || calls.is_empty() || round >= cap {
                debug!(
                    round,
                    stop = %response.stop_reason,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "loop finished"
                );
                return Ok(LoopOutcome {
                    response,
                    messages,
                    rounds: round,
                    usage,
                });
            }

            let mut results = Vec::with_capacity(calls.len());
            for (id, name, arguments) in calls {
                self.status(status_label(&name, &arguments));
                let output = self.executor.execute(&name, &id, arguments).await;
                results.push(ContentBlock::tool_result(id, output.content, output.is_error));
            }
            info!(
                round,
                tools = results.len(),
                model = %self.config.model,
                tokens = usage.total(),
                "tool round complete"
            );

            messages.push(response.to_message());
            messages.push(Message::tool_results(results));

            self.status(format!("generating... (round {round})"));
            round += 1;
            response = self.provider.invoke(&self.request(&messages)).await?;
        }
    }
}
