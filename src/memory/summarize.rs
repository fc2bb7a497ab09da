//! Rollup strategies for summary slots.

use std::sync::Arc;

use async_trait::async_trait;

use super::LogEntry;
use crate::error::{SeedError, SeedResult};
use crate::provider::Provider;
use crate::types::{CompletionRequest, Message};

const COMPRESS_INSTRUCTION: &str = "Compress these entries into one summary paragraph, max 200 words. \
Preserve all key facts, decisions, names, coordinates. Lose nothing important.";

/// Turns nine constituent entries into one rollup text.
///
/// An `Err` or an empty string leaves the slot empty; the next raw write
/// will try again.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, entries: &[LogEntry]) -> SeedResult<String>;
}

/// `[n] content` blocks separated by `---` lines
pub fn render_block(entries: &[LogEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("[{}] {}", e.number, e.content))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Deterministic rollup: the first `prefix_chars` of each entry joined by `separator`.
#[derive(Debug, Clone)]
pub struct ConcatSummarizer {
    pub prefix_chars: usize,
    pub separator: String,
}

impl Default for ConcatSummarizer {
    fn default() -> Self {
        Self {
            prefix_chars: 100,
            separator: " | ".into(),
        }
    }
}

#[async_trait]
impl Summarizer for ConcatSummarizer {
    async fn summarize(&self, entries: &[LogEntry]) -> SeedResult<String> {
        Ok(entries
            .iter()
            .map(|e| e.content.chars().take(self.prefix_chars).collect::<String>())
            .collect::<Vec<_>>()
            .join(&self.separator))
    }
}

/// Rollup through a language-model call on the summary model.
pub struct ProviderSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: usize,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 400,
        }
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    async fn summarize(&self, entries: &[LogEntry]) -> SeedResult<String> {
        let prompt = format!("{COMPRESS_INSTRUCTION}\n\n{}", render_block(entries));
        let request =
            CompletionRequest::new(self.model.clone(), vec![Message::user(prompt)], self.max_tokens);
        let response = self.provider.invoke(&request).await?;
        let text = response.text_content();
        if text.trim().is_empty() {
            return Err(SeedError::Provider(format!(
                "{} returned an empty summary",
                self.model
            )));
        }
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(contents: &[&str]) -> Vec<LogEntry> {
        contents
            .iter()
            .enumerate()
            .map(|(n, c)| LogEntry {
                number: n as i64 + 1,
                content: c.to_string(),
                created_at: String::new(),
            })
            .collect()
    }

    #[test]
    fn block_format() {
        let block = render_block(&entries(&["alpha", "beta"]));
        assert_eq!(block, "[1] alpha\n---\n[2] beta");
    }

    #[tokio::test]
    async fn concat_truncates_each_entry() {
        let long = "x".repeat(150);
        let out = ConcatSummarizer::default()
            .summarize(&entries(&[&long, "short"]))
            .await
            .unwrap();
        assert_eq!(out, format!("{} | short", "x".repeat(100)));
    }
}
