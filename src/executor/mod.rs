//! Tool dispatch for the orchestration loop.
//!
//! A dispatch never fails: unknown names and tool errors come back as error
//! outputs with a descriptive text, so the loop can always hand the backend
//! one result per call.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::store::{IDENTITY_AXIS, SHELL_AXIS, SKILL_AXIS};
use crate::tool::{ToolOutput, ToolRegistry};
use crate::types::ToolDefinition;

/// Executes tool calls by name.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Definitions advertised to the backend
    fn definitions(&self) -> Vec<ToolDefinition>;

    async fn execute(&self, name: &str, call_id: &str, arguments: serde_json::Value) -> ToolOutput;
}

/// Routes calls to a [`ToolRegistry`].
pub struct RegistryExecutor {
    tools: Arc<ToolRegistry>,
}

impl RegistryExecutor {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl ToolExecutor for RegistryExecutor {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions()
    }

    async fn execute(&self, name: &str, call_id: &str, arguments: serde_json::Value) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "unknown tool requested");
            return ToolOutput::error(format!("Unknown tool: {name}"));
        };

        let started = Instant::now();
        match tool.execute(call_id, arguments).await {
            Ok(output) => {
                info!(
                    tool = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    chars = output.content.len(),
                    "tool executed"
                );
                output
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool failed");
                ToolOutput::error(format!("Tool error ({name}): {e}"))
            }
        }
    }
}

fn axis_label(s: &str) -> &str {
    match s {
        SKILL_AXIS => "skill",
        SHELL_AXIS => "shell",
        IDENTITY_AXIS => "identity",
        other => other,
    }
}

/// Human-readable progress line shown before a tool runs.
pub fn status_label(name: &str, args: &serde_json::Value) -> String {
    let field = |key: &str| args.get(key).and_then(|v| v.as_str());
    let number = || match args.get("number") {
        Some(serde_json::Value::Null) | None => "all".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    match name {
        "pscale_list" => format!(
            "scanning pscale {}...",
            field("s").or(field("t")).or(field("i")).unwrap_or("?")
        ),
        "pscale_read" => format!("reading {}...", field("s").or(field("t")).unwrap_or("?")),
        "pscale_write" => format!(
            "writing {} ({} chars)",
            axis_label(field("s").unwrap_or("?")),
            field("content").map(|c| c.chars().count()).unwrap_or(0)
        ),
        "memory_list" => "scanning memory...".into(),
        "memory_read" => format!("reading memory #{}...", number()),
        "changelog_list" => "scanning changelog...".into(),
        "changelog_read" => format!("reading changelog #{}...", number()),
        "get_datetime" => "checking time...".into(),
        "web_fetch" => format!(
            "fetching {}...",
            field("url").unwrap_or("?").chars().take(50).collect::<String>()
        ),
        other => format!("tool: {other}"),
    }
}
