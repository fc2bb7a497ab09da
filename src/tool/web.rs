//! `web_fetch`: plain GET with a bounded body.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{invalid, opt_str, Tool, ToolContext, ToolOutput};
use crate::error::SeedResult;
use crate::types::ToolDefinition;

pub struct WebFetch {
    ctx: Arc<ToolContext>,
}

impl WebFetch {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    fn user_agent(&self) -> String {
        format!("XstreamSeed/{}", self.ctx.settings.version)
    }
}

/// Cut a body to at most `max_bytes` and decode it lossily.
pub(crate) fn truncate_body(body: &[u8], max_bytes: usize) -> String {
    let cut = &body[..body.len().min(max_bytes)];
    String::from_utf8_lossy(cut).into_owned()
}

#[async_trait]
impl Tool for WebFetch {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_fetch".into(),
            description: "Fetch URL contents.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {"url": {"type": "string"}},
                "required": ["url"]
            }),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: serde_json::Value) -> SeedResult<ToolOutput> {
        let url = opt_str(&arguments, "url").ok_or_else(|| invalid(self.name(), "missing 'url'"))?;
        debug!(%url, "web fetch");

        let mut response = self
            .ctx
            .http
            .get(&url)
            .header(reqwest::header::USER_AGENT, self.user_agent())
            .timeout(self.ctx.settings.fetch_timeout())
            .send()
            .await?;
        let status = response.status().as_u16();

        // Stop reading once the byte budget is spent
        let max = self.ctx.settings.fetch_max_bytes;
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() >= max {
                break;
            }
        }

        Ok(ToolOutput::success(format!(
            "HTTP {status}:\n{}",
            truncate_body(&body, max)
        )))
    }
}
