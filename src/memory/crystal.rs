//! Crystallization: one chat exchange compressed into one memory entry.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::NumberedLog;
use crate::error::SeedResult;
use crate::provider::Provider;
use crate::types::{CompletionRequest, Message};

const CRYSTAL_INSTRUCTION: &str = "Compress this exchange into one solid paragraph, max 150 words. \
Facts only: what was said, learned, decided. No meta-commentary. If trivial, respond: SKIP";

const EXCHANGE_CHARS: usize = 2000;
const CRYSTAL_MAX_TOKENS: usize = 300;

/// Exchanges this small are not worth a memory
pub fn is_trivial(user: &str, assistant: &str) -> bool {
    user.chars().count() < 10 && assistant.chars().count() < 50
}

pub fn render_exchange(user: &str, assistant: &str) -> String {
    let user: String = user.chars().take(EXCHANGE_CHARS).collect();
    let assistant: String = assistant.chars().take(EXCHANGE_CHARS).collect();
    format!("HUMAN: {user}\n\nINSTANCE: {assistant}")
}

/// Writes chat exchanges into the memory log via the summary model.
#[derive(Clone)]
pub struct Crystallizer {
    provider: Arc<dyn Provider>,
    model: String,
    memory: NumberedLog,
    identity: String,
}

impl Crystallizer {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        memory: NumberedLog,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            memory,
            identity: identity.into(),
        }
    }

    /// Compress and store the exchange. `Ok(None)` when nothing was written.
    pub async fn crystallize(&self, user: &str, assistant: &str) -> SeedResult<Option<i64>> {
        if is_trivial(user, assistant) {
            debug!("exchange too small to crystallize");
            return Ok(None);
        }

        let prompt = format!("{CRYSTAL_INSTRUCTION}\n\n{}", render_exchange(user, assistant));
        let request = CompletionRequest::new(
            self.model.clone(),
            vec![Message::user(prompt)],
            CRYSTAL_MAX_TOKENS,
        );
        let response = self.provider.invoke(&request).await?;
        let text = response.text_content();
        let text = text.trim();
        if text.is_empty() || text == "SKIP" {
            debug!("summary model declined the exchange");
            return Ok(None);
        }

        let number = self.memory.write(&self.identity, text).await?;
        info!(identity = %self.identity, number, "exchange crystallized");
        Ok(Some(number))
    }

    /// Run [`Self::crystallize`] as a detached task; failures are only logged.
    pub fn spawn(&self, user: String, assistant: String) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.crystallize(&user, &assistant).await {
                warn!(error = %e, "crystallization failed");
            }
        })
    }
}
