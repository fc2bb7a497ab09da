use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use super::{BootMachine, BootState};
use crate::agent::{LoopConfig, ToolLoop};
use crate::config::{BackendConfig, SeedSettings};
use crate::error::{SeedError, SeedResult};
use crate::executor::ToolExecutor;
use crate::memory::NumberedLog;
use crate::provider::Provider;
use crate::shell::{extract_artifact, validate_artifact, wrap_artifact, FALLBACK_ARTIFACT};
use crate::store::{CoordinateStore, SHELL_AXIS};
use crate::temporal;
use crate::types::Message;

/// Instruction sent as the only user turn of a boot
const BOOT_INSTRUCTION: &str = "BOOT";

/// One boot run: pick a model, let it build its shell, store the result.
pub struct BootSequence {
    pub provider: Arc<dyn Provider>,
    pub executor: Arc<dyn ToolExecutor>,
    pub store: CoordinateStore,
    pub changelog: NumberedLog,
    pub settings: Arc<SeedSettings>,
    pub backend: BackendConfig,
    pub system_prompt: String,
    pub machine: Arc<BootMachine>,
}

impl BootSequence {
    /// First model in the chain that answers a ping, else the chain's last
    /// entry. Local backends skip probing.
    pub async fn probe_model(&self) -> String {
        if self.backend.is_local() {
            return self.backend.local_model();
        }
        for model in &self.settings.model_chain {
            match self.provider.probe(model).await {
                Ok(true) => return model.clone(),
                Ok(false) => self.machine.push(format!("{model} unavailable (empty reply)")).await,
                Err(e) => {
                    warn!(%model, error = %e, "probe failed");
                    self.machine.push(format!("{model} unavailable")).await;
                }
            }
        }
        self.settings.model_chain.last().cloned().unwrap_or_default()
    }

    /// Run to completion. The caller must already hold the `booting` state.
    pub async fn run(self) {
        match self.build_shell().await {
            Ok(()) => {
                self.machine.finish(BootState::Ready).await;
                self.machine.push("boot complete").await;
            }
            Err(e) => self.recover(e).await,
        }
    }

    async fn build_shell(&self) -> SeedResult<()> {
        let machine = &self.machine;
        machine.push("probing model...").await;
        let model = self.probe_model().await;
        machine.set_model(model.clone()).await;
        machine.push(format!("using {model}")).await;
        machine
            .push(format!("calling {model} with constitution + tools..."))
            .await;

        let thinking = (!self.backend.is_local()).then_some(self.settings.boot_thinking_budget);
        let config = LoopConfig {
            model: model.clone(),
            system: self.system_prompt.clone(),
            max_tokens: self.settings.boot_max_tokens,
            thinking_budget: thinking,
            round_cap: self.settings.boot_round_cap,
        };

        // Loop progress lines flow into the boot status in order
        let (status_tx, mut status_rx) = mpsc::unbounded_channel::<String>();
        let forward_to = machine.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(line) = status_rx.recv().await {
                forward_to.push(line).await;
            }
        });
        let outcome = {
            let tool_loop = ToolLoop::new(self.provider.clone(), self.executor.clone(), config)
                .with_status(status_tx);
            tool_loop.run(vec![Message::user(BOOT_INSTRUCTION)]).await
        };
        forwarder
            .await
            .map_err(|e| SeedError::Other(anyhow::anyhow!("status forwarder failed: {e}")))?;
        let outcome = outcome?;

        machine
            .push(format!("response received (stop: {})", outcome.response.stop_reason))
            .await;

        let text = outcome.response.text_content();
        let artifact = match extract_artifact(&text) {
            Some(src) => match validate_artifact(&src) {
                Ok(()) => {
                    machine
                        .push(format!("JSX component extracted ({} chars)", src.chars().count()))
                        .await;
                    Some(src)
                }
                Err(rejection) => {
                    machine
                        .push(format!("JSX validation: {rejection}, using fallback"))
                        .await;
                    None
                }
            },
            None => None,
        };
        let artifact = match artifact {
            Some(src) => src,
            None => {
                machine.push("using fallback component").await;
                FALLBACK_ARTIFACT.to_string()
            }
        };

        let html = wrap_artifact(&artifact, &self.settings.version, &model);
        self.store
            .replace_singleton(SHELL_AXIS, &temporal::now(), "0.1", &html)
            .await?;
        machine.push(format!("shell written ({} chars)", html.len())).await;

        let note = format!("Boot. Model: {model}. Shell: {} chars.", html.len());
        if let Err(e) = self
            .changelog
            .write(&self.settings.default_identity, &note)
            .await
        {
            warn!(error = %e, "boot changelog entry failed");
        }
        Ok(())
    }

    /// Any failure still leaves a working shell behind.
    async fn recover(&self, error: SeedError) {
        warn!(error = %error, "boot failed, writing fallback shell");
        self.machine
            .push(format!("boot error: {error}, writing fallback"))
            .await;

        let model = self
            .machine
            .model()
            .await
            .unwrap_or_else(|| "unknown".to_string());
        let html = wrap_artifact(FALLBACK_ARTIFACT, &self.settings.version, &model);
        match self
            .store
            .replace_singleton(SHELL_AXIS, &temporal::now(), "0.1", &html)
            .await
        {
            Ok(_) => {
                let note = format!("Boot failed: {error}. Fallback shell written.");
                if let Err(e) = self
                    .changelog
                    .write(&self.settings.default_identity, &note)
                    .await
                {
                    warn!(error = %e, "boot failure changelog entry failed");
                }
                self.machine.finish(BootState::Ready).await;
                self.machine.push("fallback shell written").await;
            }
            Err(e) => {
                self.machine
                    .push(format!("fallback shell could not be stored: {e}"))
                    .await;
                self.machine.finish(BootState::Error).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RegistryExecutor;
    use crate::store::{CoordinateQuery, Database};
    use crate::tool::ToolRegistry;
    use crate::types::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails probes for listed models, then replays scripted responses
    struct ScriptedProvider {
        dead: Vec<&'static str>,
        responses: Mutex<Vec<CompletionResponse>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Custom("scripted".into())
        }

        async fn invoke(&self, request: &CompletionRequest) -> SeedResult<CompletionResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if request.max_tokens == crate::provider::PROBE_MAX_TOKENS {
                if self.dead.contains(&request.model.as_str()) {
                    return Err(SeedError::Provider("overloaded".into()));
                }
                return Ok(CompletionResponse::text("pong"));
            }
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(SeedError::Provider("script exhausted".into()));
            }
            Ok(responses.remove(0))
        }
    }

    fn sequence(
        dead: Vec<&'static str>,
        responses: Vec<CompletionResponse>,
        backend: BackendConfig,
    ) -> (BootSequence, Arc<ScriptedProvider>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let provider = Arc::new(ScriptedProvider {
            dead,
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        });
        let machine = Arc::new(BootMachine::new());
        let seq = BootSequence {
            provider: provider.clone(),
            executor: Arc::new(RegistryExecutor::new(Arc::new(ToolRegistry::new()))),
            store: CoordinateStore::new(db.clone()),
            changelog: NumberedLog::changelog(db),
            settings: Arc::new(SeedSettings::default()),
            backend,
            system_prompt: "constitution".into(),
            machine,
        };
        (seq, provider)
    }

    async fn shells(seq: &BootSequence) -> Vec<String> {
        seq.store
            .read(&CoordinateQuery::scale(SHELL_AXIS))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.content)
            .collect()
    }

    #[tokio::test]
    async fn probe_skips_dead_models() {
        let (seq, _) = sequence(
            vec!["claude-opus-4-6"],
            vec![],
            BackendConfig::claude("k"),
        );
        assert_eq!(seq.probe_model().await, "claude-opus-4-20250514");
        let messages = seq.machine.snapshot().await.messages;
        assert_eq!(messages, vec!["claude-opus-4-6 unavailable"]);
    }

    #[tokio::test]
    async fn probe_falls_back_to_last_in_chain() {
        let chain = SeedSettings::default().model_chain;
        let dead: Vec<&'static str> = vec![
            "claude-opus-4-6",
            "claude-opus-4-20250514",
            "claude-sonnet-4-5-20250929",
            "claude-sonnet-4-20250514",
        ];
        let (seq, _) = sequence(dead, vec![], BackendConfig::claude("k"));
        assert_eq!(seq.probe_model().await, chain[chain.len() - 1]);
    }

    #[tokio::test]
    async fn local_backend_uses_configured_model() {
        let (seq, provider) = sequence(
            vec![],
            vec![],
            BackendConfig::local("http://localhost:1234/v1/chat/completions", Some("qwen".into())),
        );
        assert_eq!(seq.probe_model().await, "qwen");
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn valid_component_becomes_the_shell() {
        let reply = format!("Here is my shell:\n```jsx\n{FALLBACK_ARTIFACT}\n```");
        let (seq, provider) = sequence(vec![], vec![CompletionResponse::text(reply)], BackendConfig::claude("k"));
        seq.machine.try_begin().await;
        let machine = seq.machine.clone();
        let store = seq.store.clone();
        let changelog = seq.changelog.clone();
        seq.run().await;

        let status = machine.snapshot().await;
        assert_eq!(status.state, BootState::Ready);
        assert_eq!(status.model.as_deref(), Some("claude-opus-4-6"));
        assert!(status.messages.iter().any(|m| m.starts_with("JSX component extracted")));
        assert_eq!(status.messages.last().map(String::as_str), Some("boot complete"));

        let shell = store.read(&CoordinateQuery::scale(SHELL_AXIS)).await.unwrap();
        assert_eq!(shell.len(), 1);
        assert!(shell[0].content.contains("model: 'claude-opus-4-6'"));

        let log = changelog.read("0.1", None).await.unwrap();
        assert!(log[0].content.starts_with("Boot. Model: claude-opus-4-6. Shell: "));

        // Boot request carried thinking, tools, system prompt and the BOOT turn
        let requests = provider.requests.lock().unwrap();
        let boot = requests.iter().find(|r| r.max_tokens == 16000).unwrap();
        assert_eq!(boot.thinking_budget, Some(10000));
        assert_eq!(boot.system, "constitution");
        assert_eq!(boot.messages[0].text_content(), "BOOT");
    }

    #[tokio::test]
    async fn invalid_component_uses_fallback() {
        let reply = "```jsx\nfunction HermitCrab() { return null; }\n```";
        let (seq, _) = sequence(vec![], vec![CompletionResponse::text(reply)], BackendConfig::claude("k"));
        seq.machine.try_begin().await;
        let machine = seq.machine.clone();
        let store = seq.store.clone();
        seq.run().await;

        let status = machine.snapshot().await;
        assert!(status.messages.contains(&"JSX validation: JSX too short, using fallback".to_string()));
        assert!(status.messages.contains(&"using fallback component".to_string()));
        let shell = store.read(&CoordinateQuery::scale(SHELL_AXIS)).await.unwrap();
        assert!(shell[0].content.contains("function HermitCrab(props)"));
    }

    #[tokio::test]
    async fn backend_failure_still_writes_fallback() {
        let (seq, _) = sequence(vec![], vec![], BackendConfig::claude("k"));
        seq.store.write(SHELL_AXIS, "t", "0.1", "<html>stale</html>").await.unwrap();
        seq.machine.try_begin().await;
        let machine = seq.machine.clone();
        let store = seq.store.clone();
        let changelog = seq.changelog.clone();
        seq.run().await;

        let status = machine.snapshot().await;
        assert_eq!(status.state, BootState::Ready);
        assert!(status.messages.iter().any(|m| m.starts_with("boot error: ")));
        assert_eq!(status.messages.last().map(String::as_str), Some("fallback shell written"));

        let shell = store.read(&CoordinateQuery::scale(SHELL_AXIS)).await.unwrap();
        assert_eq!(shell.len(), 1);
        assert!(shell[0].content.contains("function HermitCrab(props)"));

        let log = changelog.read("0.1", None).await.unwrap();
        assert!(log[0].content.starts_with("Boot failed: "));
    }

    #[tokio::test]
    async fn local_boot_has_no_thinking() {
        let reply = format!("```js\n{FALLBACK_ARTIFACT}\n```");
        let (seq, provider) = sequence(
            vec![],
            vec![CompletionResponse::text(reply)],
            BackendConfig::local("http://localhost:1234/v1/chat/completions", None),
        );
        seq.machine.try_begin().await;
        let shells_before = shells(&seq).await;
        assert!(shells_before.is_empty());
        seq.run().await;
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].model, "local");
        assert_eq!(requests[0].thinking_budget, None);
    }
}
