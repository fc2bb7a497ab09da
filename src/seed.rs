//! `Seed`: the handle an HTTP or UI layer holds.
//!
//! Owns the database, both numbered logs, the tool registry and the boot
//! machine, and exposes store CRUD, log reads, configuration, boot and chat as
//! plain async calls returning records or [`SeedError`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{LoopConfig, ToolLoop};
use crate::boot::{BootMachine, BootSequence, BootStart, BootState};
use crate::config::{BackendConfig, SeedSettings};
use crate::error::{SeedError, SeedResult};
use crate::executor::{RegistryExecutor, ToolExecutor};
use crate::memory::crystal::Crystallizer;
use crate::memory::{LogEntry, LogKind, LogSummary, NumberedLog, ProviderSummarizer, Summarizer};
use crate::prompt::{PromptFiles, GENESIS_FILE, SKILL_SEED_FILE};
use crate::provider::Provider;
use crate::shell::looks_like_html;
use crate::store::{
    CoordinateQuery, CoordinateStore, Database, DeleteReceipt, Entry, EntrySummary, IDENTITY_AXIS,
    SHELL_AXIS, SKILL_AXIS,
};
use crate::temporal;
use crate::tool::{seed_tools, ToolContext, ToolOutput};
use crate::types::{Message, Role, TokenUsage, ToolDefinition};

// ─── Backend resolution ─────────────────────────────────────────────────────

/// Looks up the saved backend on every use so a new config takes effect
/// without a restart.
#[derive(Clone)]
struct BackendSource {
    store: CoordinateStore,
    timeout: Duration,
    /// Replaces the adapter the config would build
    fixed: Option<Arc<dyn Provider>>,
}

impl BackendSource {
    async fn resolve(&self) -> SeedResult<(BackendConfig, Arc<dyn Provider>)> {
        let backend = BackendConfig::load(&self.store)
            .await?
            .ok_or(SeedError::NoConfig)?;
        let provider = match &self.fixed {
            Some(provider) => provider.clone(),
            None => backend.provider(self.timeout)?,
        };
        Ok((backend, provider))
    }
}

/// Memory rollups through whichever backend is configured at the time.
struct BackendSummarizer {
    source: BackendSource,
    summary_model: String,
}

#[async_trait]
impl Summarizer for BackendSummarizer {
    async fn summarize(&self, entries: &[LogEntry]) -> SeedResult<String> {
        let (backend, provider) = self.source.resolve().await?;
        let model = if backend.is_local() {
            backend.local_model()
        } else {
            self.summary_model.clone()
        };
        ProviderSummarizer::new(provider, model).summarize(entries).await
    }
}

/// Advertises caller-supplied definitions, dispatches to the built-in tools.
struct AdvertisedExecutor {
    definitions: Vec<ToolDefinition>,
    inner: Arc<dyn ToolExecutor>,
}

#[async_trait]
impl ToolExecutor for AdvertisedExecutor {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    async fn execute(&self, name: &str, call_id: &str, arguments: serde_json::Value) -> ToolOutput {
        self.inner.execute(name, call_id, arguments).await
    }
}

// ─── Chat shapes ────────────────────────────────────────────────────────────

/// One turn as the chat surface sends it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-request overrides; everything unset uses settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(default)]
    pub system: Option<String>,
    /// Definitions to advertise instead of the built-in set
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    /// Hosted backend only; defaults to on
    #[serde(default)]
    pub thinking: Option<bool>,
    #[serde(default)]
    pub thinking_budget: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    pub model: String,
    pub stop_reason: String,
    /// Tokens spent across every round of this turn
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Status snapshot for the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedStatus {
    pub version: String,
    pub boot_state: BootState,
    pub boot_messages: Vec<String>,
    pub model: Option<String>,
    pub has_config: bool,
    pub has_shell: bool,
    pub datetime: String,
    pub pscale_t: String,
}

/// Drop leading assistant turns and merge runs of one role, so the history
/// opens with a user turn and alternates.
pub fn sanitize_history(history: Vec<ChatTurn>) -> Vec<ChatTurn> {
    let mut sanitized: Vec<ChatTurn> = Vec::with_capacity(history.len());
    for turn in history
        .into_iter()
        .skip_while(|t| t.role == Role::Assistant)
    {
        match sanitized.last_mut() {
            Some(last) if last.role == turn.role => {
                last.content.push_str("\n\n");
                last.content.push_str(&turn.content);
            }
            _ => sanitized.push(turn),
        }
    }
    sanitized
}

fn to_message(turn: &ChatTurn) -> Message {
    match turn.role {
        Role::Assistant => Message::assistant(turn.content.clone()),
        _ => Message::user(turn.content.clone()),
    }
}

// ─── Seed ───────────────────────────────────────────────────────────────────

pub struct Seed {
    db: Arc<Database>,
    store: CoordinateStore,
    memory: NumberedLog,
    changelog: NumberedLog,
    settings: Arc<SeedSettings>,
    prompts: PromptFiles,
    boot: Arc<BootMachine>,
    /// Serializes boot starts against reboots
    lifecycle: tokio::sync::Mutex<()>,
    backends: BackendSource,
    executor: Arc<dyn ToolExecutor>,
}

impl Seed {
    /// Open the database at `settings.db_path`.
    pub fn open(settings: SeedSettings) -> SeedResult<Self> {
        let db = Database::open(&settings.db_path)?;
        info!(path = %settings.db_path.display(), version = %settings.version, "seed opened");
        Self::build(Arc::new(db), settings, None)
    }

    pub fn in_memory(settings: SeedSettings) -> SeedResult<Self> {
        Self::build(Arc::new(Database::open_in_memory()?), settings, None)
    }

    /// Use `provider` for every backend call instead of building one from the
    /// saved config. The config must still exist.
    pub fn with_provider(self, provider: Arc<dyn Provider>) -> SeedResult<Self> {
        let settings = (*self.settings).clone();
        Self::build(self.db, settings, Some(provider))
    }

    fn build(db: Arc<Database>, settings: SeedSettings, fixed: Option<Arc<dyn Provider>>) -> SeedResult<Self> {
        let settings = Arc::new(settings);
        let store = CoordinateStore::new(db.clone());
        let backends = BackendSource {
            store: store.clone(),
            timeout: settings.request_timeout(),
            fixed,
        };
        let memory = NumberedLog::new(
            db.clone(),
            LogKind::Memory,
            Arc::new(BackendSummarizer {
                source: backends.clone(),
                summary_model: settings.summary_model.clone(),
            }),
        );
        let changelog = NumberedLog::changelog(db.clone());
        let boot = Arc::new(BootMachine::new());
        let http = reqwest::Client::builder().build()?;

        let ctx = Arc::new(ToolContext {
            store: store.clone(),
            memory: memory.clone(),
            changelog: changelog.clone(),
            settings: settings.clone(),
            boot: boot.clone(),
            http,
        });
        let registry = seed_tools(ctx);
        debug!(tools = registry.len(), names = ?registry.names(), "tool registry built");
        let executor: Arc<dyn ToolExecutor> = Arc::new(RegistryExecutor::new(Arc::new(registry)));

        Ok(Self {
            db,
            prompts: PromptFiles::new(settings.base_dir.clone()),
            store,
            memory,
            changelog,
            settings,
            boot,
            lifecycle: tokio::sync::Mutex::new(()),
            backends,
            executor,
        })
    }

    pub fn settings(&self) -> &SeedSettings {
        &self.settings
    }

    pub fn store(&self) -> &CoordinateStore {
        &self.store
    }

    pub fn memory(&self) -> &NumberedLog {
        &self.memory
    }

    pub fn changelog(&self) -> &NumberedLog {
        &self.changelog
    }

    pub fn boot_machine(&self) -> &Arc<BootMachine> {
        &self.boot
    }

    // ─── Store ──────────────────────────────────────────────────────────

    pub async fn write(&self, s: &str, t: &str, i: &str, content: &str) -> SeedResult<i64> {
        self.store.write(s, t, i, content).await
    }

    pub async fn read(&self, query: &CoordinateQuery) -> SeedResult<Vec<Entry>> {
        self.store.read(query).await
    }

    pub async fn list(&self, query: &CoordinateQuery) -> SeedResult<Vec<EntrySummary>> {
        self.store.list(query).await
    }

    pub async fn delete(&self, id: i64) -> SeedResult<DeleteReceipt> {
        self.store.delete(id).await
    }

    // ─── Logs ───────────────────────────────────────────────────────────

    fn log(&self, kind: LogKind) -> &NumberedLog {
        match kind {
            LogKind::Memory => &self.memory,
            LogKind::Changelog => &self.changelog,
        }
    }

    pub async fn log_write(&self, kind: LogKind, identity: &str, content: &str) -> SeedResult<i64> {
        self.log(kind).write(identity, content).await
    }

    pub async fn log_read(&self, kind: LogKind, identity: &str, number: Option<i64>) -> SeedResult<Vec<LogEntry>> {
        self.log(kind).read(identity, number).await
    }

    pub async fn log_list(&self, kind: LogKind, identity: &str, level: Option<u32>) -> SeedResult<Vec<LogSummary>> {
        self.log(kind).list(identity, level).await
    }

    // ─── Config ─────────────────────────────────────────────────────────

    pub async fn save_config(&self, config: &BackendConfig) -> SeedResult<i64> {
        config.save(&self.store).await
    }

    pub async fn get_config(&self) -> SeedResult<Option<BackendConfig>> {
        BackendConfig::load(&self.store).await
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Seed an empty store from the base directory. Returns whether anything
    /// was written.
    pub async fn first_boot_setup(&self) -> SeedResult<bool> {
        if !self.store.is_empty().await? {
            return Ok(false);
        }
        let identity = self.settings.default_identity.as_str();

        if let Some(skill) = self.prompts.read_optional(SKILL_SEED_FILE).await? {
            self.store
                .write(SKILL_AXIS, &temporal::now(), identity, &skill)
                .await?;
            info!(chars = skill.len(), "skill seeded");
        }
        if let Some(genesis) = self.prompts.read_optional(GENESIS_FILE).await? {
            self.store
                .write(IDENTITY_AXIS, &temporal::now(), identity, &genesis)
                .await?;
            info!(chars = genesis.len(), "genesis seeded");
        }

        let record = serde_json::json!({
            "type": "identity",
            "pscale_i": identity,
            "version": self.settings.version,
            "created": chrono::Utc::now().to_rfc3339(),
        });
        self.store
            .write(IDENTITY_AXIS, &temporal::now(), identity, &record.to_string())
            .await?;
        info!("first boot setup complete");
        Ok(true)
    }

    /// Start a boot in the background unless one is running.
    pub async fn run_boot(&self) -> SeedResult<BootStart> {
        let (backend, provider) = self.backends.resolve().await?;
        let system_prompt = self.prompts.system_prompt().await?;
        let _lifecycle = self.lifecycle.lock().await;
        if !self.boot.try_begin().await {
            return Ok(BootStart::AlreadyBooting);
        }

        let sequence = BootSequence {
            provider,
            executor: self.executor.clone(),
            store: self.store.clone(),
            changelog: self.changelog.clone(),
            settings: self.settings.clone(),
            backend,
            system_prompt,
            machine: self.boot.clone(),
        };
        tokio::spawn(sequence.run());
        Ok(BootStart::Started)
    }

    /// Forget the current shell and return to `idle`.
    ///
    /// While a boot is running this is a no-op returning `false`: the shell
    /// and the running boot's status are left alone.
    pub async fn reboot(&self) -> SeedResult<bool> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.boot.state().await == BootState::Booting {
            info!("reboot refused, boot in progress");
            return Ok(false);
        }
        for entry in self.store.read(&CoordinateQuery::scale(SHELL_AXIS)).await? {
            self.store.delete(entry.id).await?;
        }
        self.boot.reset().await;
        info!("reboot requested, shell cleared");
        Ok(true)
    }

    /// Newest shell page. A stored shell that is not HTML is purged.
    pub async fn current_shell(&self) -> SeedResult<Option<String>> {
        let mut shells = self.store.read(&CoordinateQuery::scale(SHELL_AXIS)).await?;
        let Some(latest) = shells.pop() else {
            return Ok(None);
        };
        if looks_like_html(&latest.content) {
            return Ok(Some(latest.content));
        }
        warn!(id = latest.id, "stored shell is not HTML, purging");
        for entry in shells.into_iter().chain(std::iter::once(latest)) {
            self.store.delete(entry.id).await?;
        }
        Ok(None)
    }

    pub async fn status(&self) -> SeedResult<SeedStatus> {
        let boot = self.boot.snapshot().await;
        let has_config = self.get_config().await?.is_some();
        let has_shell = !self
            .store
            .read(&CoordinateQuery::scale(SHELL_AXIS))
            .await?
            .is_empty();
        let now = chrono::Utc::now();
        Ok(SeedStatus {
            version: self.settings.version.clone(),
            boot_state: boot.state,
            boot_messages: boot.messages,
            model: boot.model,
            has_config,
            has_shell,
            datetime: now.to_rfc3339(),
            pscale_t: temporal::encode(now),
        })
    }

    // ─── Chat ───────────────────────────────────────────────────────────

    /// Run the tool loop over a chat history and crystallize the exchange in
    /// the background.
    pub async fn handle_chat(&self, history: Vec<ChatTurn>, options: ChatOptions) -> SeedResult<ChatReply> {
        let (backend, provider) = self.backends.resolve().await?;
        let turns = sanitize_history(history);
        let Some(last) = turns.last() else {
            return Err(SeedError::Config("no messages".into()));
        };
        let user_text = last.content.clone();

        let model = match self.boot.model().await {
            Some(model) => model,
            None if backend.is_local() => backend.local_model(),
            None => self.settings.model_chain.first().cloned().unwrap_or_default(),
        };
        let system = match options.system {
            Some(system) => system,
            None => self.prompts.system_prompt().await?,
        };
        let executor: Arc<dyn ToolExecutor> = match options.tools {
            Some(definitions) => Arc::new(AdvertisedExecutor {
                definitions,
                inner: self.executor.clone(),
            }),
            None => self.executor.clone(),
        };
        let thinking = (!backend.is_local() && options.thinking.unwrap_or(true))
            .then(|| options.thinking_budget.unwrap_or(self.settings.chat_thinking_budget));

        let config = LoopConfig {
            model: model.clone(),
            system,
            max_tokens: options.max_tokens.unwrap_or(self.settings.chat_max_tokens),
            thinking_budget: thinking,
            round_cap: self.settings.chat_round_cap,
        };
        let messages = turns.iter().map(to_message).collect();
        let outcome = ToolLoop::new(provider.clone(), executor, config)
            .run(messages)
            .await?;
        let text = outcome.response.text_content();
        info!(
            %model,
            rounds = outcome.rounds,
            stop = %outcome.response.stop_reason,
            input_tokens = outcome.usage.input_tokens,
            output_tokens = outcome.usage.output_tokens,
            "chat answered"
        );

        let summary_model = if backend.is_local() {
            backend.local_model()
        } else {
            self.settings.summary_model.clone()
        };
        Crystallizer::new(
            provider,
            summary_model,
            self.memory.clone(),
            self.settings.default_identity.clone(),
        )
        .spawn(user_text, text.clone());

        Ok(ChatReply {
            text,
            model,
            stop_reason: outcome.response.stop_reason.to_string(),
            usage: outcome.usage,
        })
    }
}
