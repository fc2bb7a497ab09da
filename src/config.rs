//! Configuration: process settings from TOML and the backend record kept in the store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SeedError, SeedResult};
use crate::provider::{AnthropicProvider, OpenAIProvider, Provider};
use crate::store::{CoordinateStore, CoordinateQuery, IDENTITY_AXIS};
use crate::temporal;

/// Environment variable overriding [`SeedSettings::db_path`]
pub const DB_PATH_ENV: &str = "SEED_DB_PATH";

/// Model reported for a local backend with no configured model
pub const LOCAL_MODEL_FALLBACK: &str = "local";

fn default_db_path() -> PathBuf {
    PathBuf::from("pscale.db")
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_version() -> String {
    "seed-0.1-g-1".into()
}

fn default_model_chain() -> Vec<String> {
    [
        "claude-opus-4-6",
        "claude-opus-4-20250514",
        "claude-sonnet-4-5-20250929",
        "claude-sonnet-4-20250514",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_summary_model() -> String {
    "claude-haiku-4-5-20251001".into()
}

fn default_chat_round_cap() -> usize {
    10
}

fn default_boot_round_cap() -> usize {
    15
}

fn default_boot_max_tokens() -> usize {
    16000
}

fn default_chat_max_tokens() -> usize {
    4096
}

fn default_boot_thinking_budget() -> usize {
    10000
}

fn default_chat_thinking_budget() -> usize {
    4000
}

fn default_request_timeout_secs() -> u64 {
    180
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_fetch_max_bytes() -> usize {
    100_000
}

fn default_identity() -> String {
    "0.1".into()
}

/// Process-level settings.
///
/// ```toml
/// db_path = "/var/lib/seed/pscale.db"
/// base_dir = "/opt/seed"
/// model_chain = ["claude-sonnet-4-5-20250929"]
/// chat_round_cap = 6
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedSettings {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Directory holding prompt and seed files
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_version")]
    pub version: String,
    /// Hosted-model probe order, most preferred first
    #[serde(default = "default_model_chain")]
    pub model_chain: Vec<String>,
    #[serde(default = "default_summary_model")]
    pub summary_model: String,
    #[serde(default = "default_chat_round_cap")]
    pub chat_round_cap: usize,
    #[serde(default = "default_boot_round_cap")]
    pub boot_round_cap: usize,
    #[serde(default = "default_boot_max_tokens")]
    pub boot_max_tokens: usize,
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: usize,
    #[serde(default = "default_boot_thinking_budget")]
    pub boot_thinking_budget: usize,
    #[serde(default = "default_chat_thinking_budget")]
    pub chat_thinking_budget: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: usize,
    #[serde(default = "default_identity")]
    pub default_identity: String,
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            base_dir: default_base_dir(),
            version: default_version(),
            model_chain: default_model_chain(),
            summary_model: default_summary_model(),
            chat_round_cap: default_chat_round_cap(),
            boot_round_cap: default_boot_round_cap(),
            boot_max_tokens: default_boot_max_tokens(),
            chat_max_tokens: default_chat_max_tokens(),
            boot_thinking_budget: default_boot_thinking_budget(),
            chat_thinking_budget: default_chat_thinking_budget(),
            request_timeout_secs: default_request_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            fetch_max_bytes: default_fetch_max_bytes(),
            default_identity: default_identity(),
        }
    }
}

impl SeedSettings {
    /// Load from a TOML file. A missing file yields defaults; `SEED_DB_PATH` wins over both.
    pub fn load(path: &Path) -> SeedResult<Self> {
        let mut settings = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            Self::from_toml(&raw)?
        } else {
            debug!(path = %path.display(), "no settings file, using defaults");
            Self::default()
        };
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(raw: &str) -> SeedResult<Self> {
        let settings: Self =
            toml::from_str(raw).map_err(|e| SeedError::Config(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            if !path.is_empty() {
                self.db_path = PathBuf::from(path);
            }
        }
    }

    pub fn validate(&self) -> SeedResult<()> {
        if self.model_chain.is_empty() {
            return Err(SeedError::Config("model_chain must not be empty".into()));
        }
        if self.chat_round_cap == 0 || self.boot_round_cap == 0 {
            return Err(SeedError::Config("round caps must be at least 1".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

// ─── Backend record ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Hosted messages API
    Claude,
    /// OpenAI-style endpoint on the local network
    Local,
}

/// The live backend choice, stored as JSON with `"type": "config"` on the identity axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub backend: Backend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

const RECORD_TYPE: &str = "config";

impl BackendConfig {
    pub fn claude(api_key: impl Into<String>) -> Self {
        Self {
            backend: Backend::Claude,
            api_key: Some(api_key.into()),
            endpoint: None,
            model: None,
        }
    }

    pub fn local(endpoint: impl Into<String>, model: Option<String>) -> Self {
        Self {
            backend: Backend::Local,
            api_key: None,
            endpoint: Some(endpoint.into()),
            model,
        }
    }

    pub fn is_local(&self) -> bool {
        self.backend == Backend::Local
    }

    /// Model a local backend answers as
    pub fn local_model(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| LOCAL_MODEL_FALLBACK.to_string())
    }

    /// Parse a store entry; `None` unless it is a config record.
    pub fn from_record(content: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(content).ok()?;
        if value.get("type").and_then(|v| v.as_str()) != Some(RECORD_TYPE) {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn to_record(&self) -> SeedResult<String> {
        let mut value = serde_json::to_value(self)?;
        value["type"] = serde_json::Value::String(RECORD_TYPE.into());
        Ok(serde_json::to_string(&value)?)
    }

    /// First config record on the identity axis.
    pub async fn load(store: &CoordinateStore) -> SeedResult<Option<Self>> {
        let entries = store.read(&CoordinateQuery::scale(IDENTITY_AXIS)).await?;
        Ok(entries.iter().find_map(|e| Self::from_record(&e.content)))
    }

    /// Replace every config record with this one. Other identity-axis entries are kept.
    pub async fn save(&self, store: &CoordinateStore) -> SeedResult<i64> {
        for entry in store.read(&CoordinateQuery::scale(IDENTITY_AXIS)).await? {
            if Self::from_record(&entry.content).is_some() {
                store.delete(entry.id).await?;
            }
        }
        let id = store
            .write(IDENTITY_AXIS, &temporal::now(), "0.1", &self.to_record()?)
            .await?;
        info!(id, backend = ?self.backend, "backend config saved");
        Ok(id)
    }

    /// Build the adapter this record points at.
    pub fn provider(&self, timeout: Duration) -> SeedResult<Arc<dyn Provider>> {
        match self.backend {
            Backend::Claude => {
                let key = self
                    .api_key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| SeedError::Config("claude backend needs an api_key".into()))?;
                Ok(Arc::new(AnthropicProvider::new(key, timeout)?))
            }
            Backend::Local => {
                let endpoint = self
                    .endpoint
                    .as_deref()
                    .filter(|e| !e.is_empty())
                    .ok_or_else(|| SeedError::Config("local backend needs an endpoint".into()))?;
                let provider = OpenAIProvider::new(endpoint, timeout)?
                    .with_api_key(self.api_key.clone().unwrap_or_default());
                Ok(Arc::new(provider))
            }
        }
    }
}
