//! Coordinate-store tools. Writes to the shell axis are validated and
//! rewrapped instead of stored verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{invalid, opt_int, opt_str, Tool, ToolContext, ToolOutput};
use crate::error::SeedResult;
use crate::shell;
use crate::store::{CoordinateQuery, IDENTITY_AXIS, SHELL_AXIS, SKILL_AXIS};
use crate::temporal;
use crate::types::ToolDefinition;

const DEFAULT_I: &str = "0.1";

const SHELL_PROPS_HINT: &str = "Write a HermitCrab React component using props \
(React, callLLM, version, model, pscale, getSource, recompile).";

fn coordinate_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "s": {"type": "string"},
            "t": {"type": "string"},
            "i": {"type": "string"}
        }
    })
}

fn query_from(args: &serde_json::Value) -> CoordinateQuery {
    CoordinateQuery {
        s: opt_str(args, "s"),
        t: opt_str(args, "t"),
        i: opt_str(args, "i"),
    }
}

// ─── pscale_read ────────────────────────────────────────────────────────────

pub struct PscaleRead {
    ctx: Arc<ToolContext>,
}

impl PscaleRead {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for PscaleRead {
    fn name(&self) -> &str {
        "pscale_read"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "pscale_read".into(),
            description: "Read pscale entries by exact coordinate match. For skills (s=0.1), shell (s=0.2), identity (s=0.3).".into(),
            input_schema: coordinate_schema(),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: serde_json::Value) -> SeedResult<ToolOutput> {
        let entries = self.ctx.store.read(&query_from(&arguments)).await?;
        ToolOutput::json(&entries)
    }
}

// ─── pscale_write ───────────────────────────────────────────────────────────

pub struct PscaleWrite {
    ctx: Arc<ToolContext>,
}

impl PscaleWrite {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    async fn write_shell(&self, t: &str, i: &str, content: &str) -> SeedResult<ToolOutput> {
        if let Err(rejection) = shell::validate_artifact(content) {
            info!(reason = %rejection, "shell write rejected");
            return ToolOutput::json(&json!({
                "error": format!("Shell write rejected: {rejection}. {SHELL_PROPS_HINT}"),
                "status": "rejected",
            }));
        }

        let model = self.ctx.boot.model().await.unwrap_or_default();
        let html = shell::wrap_artifact(content, &self.ctx.settings.version, &model);
        let id = self
            .ctx
            .store
            .replace_singleton(SHELL_AXIS, t, i, &html)
            .await?;
        info!(id, chars = html.len(), "shell replaced by tool write");

        self.ctx
            .note_change(&format!("Shell updated ({} chars JSX)", content.chars().count()))
            .await;

        ToolOutput::json(&json!({
            "id": id,
            "status": "shell_updated",
            "size": html.len(),
            "note": "JSX validated and wrapped. User should refresh browser to see changes.",
        }))
    }
}

#[async_trait]
impl Tool for PscaleWrite {
    fn name(&self) -> &str {
        "pscale_write"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "pscale_write".into(),
            description: "Write entry to pscale DB. s=0.1 for skills, s=0.3 for identity. \
                SPECIAL: s=0.2 updates your shell: write a HermitCrab React component (JSX) and \
                the kernel validates and wraps it. User must refresh browser after a shell update. \
                Memory and changelog have their own tools; do not use pscale_write for those."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "s": {"type": "string"},
                    "t": {"type": "string"},
                    "i": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["content"]
            }),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: serde_json::Value) -> SeedResult<ToolOutput> {
        let content =
            opt_str(&arguments, "content").ok_or_else(|| invalid(self.name(), "missing 'content'"))?;
        let s = opt_str(&arguments, "s").unwrap_or_default();
        let t = opt_str(&arguments, "t")
            .filter(|t| !t.is_empty())
            .unwrap_or_else(temporal::now);
        let i = opt_str(&arguments, "i").unwrap_or_else(|| DEFAULT_I.to_string());

        if s == SHELL_AXIS {
            return self.write_shell(&t, &i, &content).await;
        }

        let id = self.ctx.store.write(&s, &t, &i, &content).await?;

        match s.as_str() {
            SKILL_AXIS => {
                let preview: String = content.chars().take(80).collect::<String>().replace('\n', " ");
                self.ctx.note_change(&format!("Skill written: {preview}...")).await;
            }
            IDENTITY_AXIS => {
                self.ctx
                    .note_change(&format!(
                        "Identity/config updated ({} chars)",
                        content.chars().count()
                    ))
                    .await;
            }
            _ => {}
        }

        ToolOutput::json(&json!({"id": id, "status": "written"}))
    }
}

// ─── pscale_list ────────────────────────────────────────────────────────────

pub struct PscaleList {
    ctx: Arc<ToolContext>,
}

impl PscaleList {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for PscaleList {
    fn name(&self) -> &str {
        "pscale_list"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "pscale_list".into(),
            description: "List pscale entries with prefix matching. For skills, shell, identity, world content.".into(),
            input_schema: coordinate_schema(),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: serde_json::Value) -> SeedResult<ToolOutput> {
        let rows = self.ctx.store.list(&query_from(&arguments)).await?;
        ToolOutput::json(&rows)
    }
}

// ─── pscale_delete ──────────────────────────────────────────────────────────

pub struct PscaleDelete {
    ctx: Arc<ToolContext>,
}

impl PscaleDelete {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for PscaleDelete {
    fn name(&self) -> &str {
        "pscale_delete"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "pscale_delete".into(),
            description: "Delete a pscale entry by ID.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {"id": {"type": "integer"}},
                "required": ["id"]
            }),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: serde_json::Value) -> SeedResult<ToolOutput> {
        let id = opt_int(&arguments, "id").ok_or_else(|| invalid(self.name(), "missing 'id'"))?;
        let receipt = self.ctx.store.delete(id).await?;
        ToolOutput::json(&receipt)
    }
}
