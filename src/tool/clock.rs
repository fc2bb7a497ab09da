use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use super::{Tool, ToolOutput};
use crate::error::SeedResult;
use crate::temporal;
use crate::types::ToolDefinition;

/// `get_datetime`: wall clock plus its temporal coordinate
pub struct GetDatetime;

pub(crate) fn datetime_payload(now: DateTime<Utc>) -> serde_json::Value {
    json!({
        "iso": now.to_rfc3339(),
        "pscale_t": temporal::encode(now),
        "local": now.format("%A %d %B %Y, %H:%M UTC").to_string(),
    })
}

#[async_trait]
impl Tool for GetDatetime {
    fn name(&self) -> &str {
        "get_datetime"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_datetime".into(),
            description: "Get current datetime and pscale temporal coordinate.".into(),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(&self, _call_id: &str, _arguments: serde_json::Value) -> SeedResult<ToolOutput> {
        ToolOutput::json(&datetime_payload(Utc::now()))
    }
}
