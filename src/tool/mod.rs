//! Model-callable tools over the coordinate store, both numbered logs, the
//! clock and the web.

pub mod clock;
pub mod logs;
pub mod pscale;
pub mod web;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::boot::BootMachine;
use crate::config::{BackendConfig, SeedSettings};
use crate::error::{SeedError, SeedResult};
use crate::memory::NumberedLog;
use crate::store::CoordinateStore;
use crate::types::ToolDefinition;

/// A tool that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match the definition name)
    fn name(&self) -> &str;

    /// Tool definition for sending to the LLM
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given arguments
    async fn execute(&self, call_id: &str, arguments: serde_json::Value) -> SeedResult<ToolOutput>;
}

/// Output from a tool execution
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    /// Serialize a value as the tool's JSON text result
    pub fn json<T: serde::Serialize>(value: &T) -> SeedResult<Self> {
        Ok(Self::success(serde_json::to_string(value)?))
    }
}

/// Registry of tools available to the agent
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Shared state ───────────────────────────────────────────────────────────

/// What the built-in tools read and write
pub struct ToolContext {
    pub store: CoordinateStore,
    pub memory: NumberedLog,
    pub changelog: NumberedLog,
    pub settings: Arc<SeedSettings>,
    /// Supplies the model name stamped into rewrapped shells
    pub boot: Arc<BootMachine>,
    pub http: reqwest::Client,
}

impl ToolContext {
    /// Append an infrastructure event to the changelog when a backend is
    /// configured. Failures are logged and dropped.
    pub async fn note_change(&self, message: &str) {
        match BackendConfig::load(&self.store).await {
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "config lookup failed, changelog entry skipped");
                return;
            }
        }
        if let Err(e) = self
            .changelog
            .write(&self.settings.default_identity, message)
            .await
        {
            warn!(error = %e, "auto-changelog write failed");
        }
    }
}

/// Every built-in tool, in the order they are advertised.
pub fn seed_tools(ctx: Arc<ToolContext>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(pscale::PscaleRead::new(ctx.clone())));
    registry.register(Box::new(pscale::PscaleWrite::new(ctx.clone())));
    registry.register(Box::new(pscale::PscaleList::new(ctx.clone())));
    registry.register(Box::new(pscale::PscaleDelete::new(ctx.clone())));
    registry.register(Box::new(logs::LogList::memory(ctx.clone())));
    registry.register(Box::new(logs::LogRead::memory(ctx.clone())));
    registry.register(Box::new(logs::LogList::changelog(ctx.clone())));
    registry.register(Box::new(logs::LogRead::changelog(ctx.clone())));
    registry.register(Box::new(web::WebFetch::new(ctx)));
    registry.register(Box::new(clock::GetDatetime));
    registry
}

// ─── Argument helpers ───────────────────────────────────────────────────────

pub(crate) fn opt_str(args: &serde_json::Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(String::from)
}

pub(crate) fn opt_int(args: &serde_json::Value, key: &str) -> Option<i64> {
    let v = args.get(key)?;
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

pub(crate) fn invalid(tool: &str, message: impl Into<String>) -> SeedError {
    SeedError::InvalidToolInput {
        tool_name: tool.into(),
        message: message.into(),
    }
}
