//! Read-only tools over the memory and changelog logs.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{invalid, opt_int, opt_str, Tool, ToolContext, ToolOutput};
use crate::error::SeedResult;
use crate::memory::{LogKind, NumberedLog};
use crate::types::ToolDefinition;

fn log_of(ctx: &ToolContext, kind: LogKind) -> &NumberedLog {
    match kind {
        LogKind::Memory => &ctx.memory,
        LogKind::Changelog => &ctx.changelog,
    }
}

fn identity_arg(ctx: &ToolContext, args: &serde_json::Value) -> String {
    opt_str(args, "identity")
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| ctx.settings.default_identity.clone())
}

/// `memory_list` / `changelog_list`
pub struct LogList {
    ctx: Arc<ToolContext>,
    kind: LogKind,
    name: &'static str,
}

impl LogList {
    pub fn memory(ctx: Arc<ToolContext>) -> Self {
        Self {
            ctx,
            kind: LogKind::Memory,
            name: "memory_list",
        }
    }

    pub fn changelog(ctx: Arc<ToolContext>) -> Self {
        Self {
            ctx,
            kind: LogKind::Changelog,
            name: "changelog_list",
        }
    }
}

#[async_trait]
impl Tool for LogList {
    fn name(&self) -> &str {
        self.name
    }

    fn definition(&self) -> ToolDefinition {
        let description = match self.kind {
            LogKind::Memory => {
                "List memory entries using semantic number compaction. Numbers: 1-9 are raw \
                 entries, 10/20/30 are level-1 summaries, 100/200 are level-2 summaries. Set \
                 level=0 for raw only, level=1 for level-1 summaries, omit for all. Use to \
                 navigate accumulated memory at any zoom level."
            }
            LogKind::Changelog => {
                "List changelog entries. Same semantic number compaction as memory."
            }
        };
        ToolDefinition {
            name: self.name.into(),
            description: description.into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "identity": {"type": "string", "default": "0.1"},
                    "level": {
                        "type": "integer",
                        "description": "0=raw entries, 1=level-1 summaries, 2=level-2 summaries, omit=all"
                    }
                }
            }),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: serde_json::Value) -> SeedResult<ToolOutput> {
        let identity = identity_arg(&self.ctx, &arguments);
        let level = opt_int(&arguments, "level")
            .map(|l| {
                u32::try_from(l)
                    .map_err(|_| invalid(self.name, format!("level out of range: {l}")))
            })
            .transpose()?;
        let rows = log_of(&self.ctx, self.kind).list(&identity, level).await?;
        ToolOutput::json(&rows)
    }
}

/// `memory_read` / `changelog_read`
pub struct LogRead {
    ctx: Arc<ToolContext>,
    kind: LogKind,
    name: &'static str,
}

impl LogRead {
    pub fn memory(ctx: Arc<ToolContext>) -> Self {
        Self {
            ctx,
            kind: LogKind::Memory,
            name: "memory_read",
        }
    }

    pub fn changelog(ctx: Arc<ToolContext>) -> Self {
        Self {
            ctx,
            kind: LogKind::Changelog,
            name: "changelog_read",
        }
    }
}

#[async_trait]
impl Tool for LogRead {
    fn name(&self) -> &str {
        self.name
    }

    fn definition(&self) -> ToolDefinition {
        let description = match self.kind {
            LogKind::Memory => {
                "Read a memory entry by semantic number. Number 4321 = 4th level-3 summary, \
                 3rd level-2 summary, 2nd level-1 group, 1st raw entry. Omit number to read all."
            }
            LogKind::Changelog => "Read a changelog entry by semantic number. Omit number to read all.",
        };
        ToolDefinition {
            name: self.name.into(),
            description: description.into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "identity": {"type": "string", "default": "0.1"},
                    "number": {"type": "integer"}
                }
            }),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: serde_json::Value) -> SeedResult<ToolOutput> {
        let identity = identity_arg(&self.ctx, &arguments);
        let number = opt_int(&arguments, "number");
        let rows = log_of(&self.ctx, self.kind).read(&identity, number).await?;
        ToolOutput::json(&rows)
    }
}
