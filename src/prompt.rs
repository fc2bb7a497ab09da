//! Prompt and seed files read from the base directory.

use std::path::{Path, PathBuf};

use crate::error::SeedResult;

/// Skill document written to the skill axis on first boot
pub const SKILL_SEED_FILE: &str = "pscale-coordinate-generation-skill.md";

/// Genesis document written to the identity axis on first boot
pub const GENESIS_FILE: &str = "GENESIS.md";

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Files under `base_dir` that are read, never written
pub struct PromptFiles {
    base_dir: PathBuf,
}

impl PromptFiles {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// System prompt sections, in order
    const SYSTEM_FILES: &'static [&'static str] = &["constitution.md", "environment.md"];

    /// Contents of `name`, or `None` when the file does not exist.
    pub async fn read_optional(&self, name: &str) -> SeedResult<Option<String>> {
        let path = self.base_dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(tokio::fs::read_to_string(&path).await?))
    }

    /// Read all system prompt files that exist
    pub async fn read_all(&self) -> SeedResult<Vec<(String, String)>> {
        let mut results = Vec::new();
        for &name in Self::SYSTEM_FILES {
            if let Some(content) = self.read_optional(name).await? {
                results.push((name.to_string(), content));
            }
        }
        Ok(results)
    }

    /// Existing system files joined by a horizontal rule; empty when none exist.
    pub async fn system_prompt(&self) -> SeedResult<String> {
        let parts: Vec<String> = self.read_all().await?.into_iter().map(|(_, c)| c).collect();
        Ok(parts.join(SECTION_SEPARATOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_dir_gives_empty_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let files = PromptFiles::new(dir.path());
        assert!(files.read_all().await.unwrap().is_empty());
        assert_eq!(files.system_prompt().await.unwrap(), "");
    }

    #[tokio::test]
    async fn joins_in_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("environment.md"), "ENV").await.unwrap();
        tokio::fs::write(dir.path().join("constitution.md"), "CONST").await.unwrap();

        let prompt = PromptFiles::new(dir.path()).system_prompt().await.unwrap();
        assert_eq!(prompt, "CONST\n\n---\n\nENV");
    }

    #[tokio::test]
    async fn single_file_has_no_separator() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("environment.md"), "ENV").await.unwrap();
        let prompt = PromptFiles::new(dir.path()).system_prompt().await.unwrap();
        assert_eq!(prompt, "ENV");
    }

    #[tokio::test]
    async fn optional_seed_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = PromptFiles::new(dir.path());
        assert!(files.read_optional(GENESIS_FILE).await.unwrap().is_none());
        tokio::fs::write(dir.path().join(GENESIS_FILE), "# Genesis").await.unwrap();
        assert_eq!(
            files.read_optional(GENESIS_FILE).await.unwrap().as_deref(),
            Some("# Genesis")
        );
    }
}
