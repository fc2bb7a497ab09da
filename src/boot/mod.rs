//! Boot state machine.
//!
//! `idle → booting → ready`, with `error` reserved for a boot that could not
//! even store the fallback shell. At most one boot runs at a time: a start
//! or reset request while `booting` is refused, any other state restarts.

mod sequence;

pub use sequence::BootSequence;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootState {
    Idle,
    Booting,
    Ready,
    Error,
}

impl std::fmt::Display for BootState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BootState::Idle => "idle",
            BootState::Booting => "booting",
            BootState::Ready => "ready",
            BootState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Snapshot of boot progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootStatus {
    pub state: BootState,
    /// Progress lines, oldest first
    pub messages: Vec<String>,
    /// Model chosen by the probe
    pub model: Option<String>,
}

impl Default for BootStatus {
    fn default() -> Self {
        Self {
            state: BootState::Idle,
            messages: Vec::new(),
            model: None,
        }
    }
}

/// Outcome of a boot request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootStart {
    Started,
    AlreadyBooting,
}

/// Shared boot status, readable while a boot task appends to it.
#[derive(Debug, Default)]
pub struct BootMachine {
    status: RwLock<BootStatus>,
}

impl BootMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> BootStatus {
        self.status.read().await.clone()
    }

    pub async fn state(&self) -> BootState {
        self.status.read().await.state
    }

    pub async fn model(&self) -> Option<String> {
        self.status.read().await.model.clone()
    }

    /// Enter `booting` unless a boot is already running.
    pub async fn try_begin(&self) -> bool {
        let mut status = self.status.write().await;
        if status.state == BootState::Booting {
            return false;
        }
        *status = BootStatus {
            state: BootState::Booting,
            messages: vec!["starting...".into()],
            model: None,
        };
        info!("boot started");
        true
    }

    /// Append a progress line
    pub async fn push(&self, message: impl Into<String>) {
        let message = message.into();
        info!(%message, "boot");
        self.status.write().await.messages.push(message);
    }

    pub async fn set_model(&self, model: impl Into<String>) {
        self.status.write().await.model = Some(model.into());
    }

    pub async fn finish(&self, state: BootState) {
        self.status.write().await.state = state;
        info!(%state, "boot finished");
    }

    /// Back to `idle` with no messages and no model. Refused while a boot
    /// is running, so a second run can never start underneath it.
    pub async fn reset(&self) -> bool {
        let mut status = self.status.write().await;
        if status.state == BootState::Booting {
            return false;
        }
        *status = BootStatus::default();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_idle() {
        let machine = BootMachine::new();
        let status = machine.snapshot().await;
        assert_eq!(status.state, BootState::Idle);
        assert!(status.messages.is_empty());
        assert!(status.model.is_none());
    }

    #[tokio::test]
    async fn only_one_boot_at_a_time() {
        let machine = BootMachine::new();
        assert!(machine.try_begin().await);
        assert!(!machine.try_begin().await);
        assert_eq!(machine.snapshot().await.messages, vec!["starting..."]);

        machine.finish(BootState::Ready).await;
        assert!(machine.try_begin().await);
    }

    #[tokio::test]
    async fn restart_clears_previous_run() {
        let machine = BootMachine::new();
        machine.try_begin().await;
        machine.set_model("claude-opus-4-6").await;
        machine.push("probing model...").await;
        machine.finish(BootState::Error).await;

        assert!(machine.try_begin().await);
        let status = machine.snapshot().await;
        assert_eq!(status.messages.len(), 1);
        assert!(status.model.is_none());
    }

    #[tokio::test]
    async fn reset_returns_to_idle() {
        let machine = BootMachine::new();
        machine.try_begin().await;
        machine.push("x").await;
        machine.finish(BootState::Ready).await;
        assert!(machine.reset().await);
        assert_eq!(machine.snapshot().await, BootStatus::default());
    }

    #[tokio::test]
    async fn reset_while_booting_keeps_the_running_boot() {
        let machine = BootMachine::new();
        assert!(machine.try_begin().await);
        machine.push("probing model...").await;

        assert!(!machine.reset().await);
        assert!(!machine.try_begin().await);
        let status = machine.snapshot().await;
        assert_eq!(status.state, BootState::Booting);
        assert_eq!(status.messages, vec!["starting...", "probing model..."]);

        machine.finish(BootState::Ready).await;
        assert!(machine.reset().await);
        assert!(machine.try_begin().await);
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&BootState::Booting).unwrap(), "\"booting\"");
        assert_eq!(BootState::Ready.to_string(), "ready");
    }
}
