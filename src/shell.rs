//! The shell: a self-contained HTML page wrapping a model-authored
//! `HermitCrab` React component.
//!
//! The component source is pulled out of free-form model text, checked for a
//! few structural markers, and substituted into a fixed wrapper that supplies
//! React, the chat bridge and store helpers as props.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const SHELL_WRAPPER: &str = include_str!("../assets/shell_wrapper.html");

/// Known-good component used whenever boot cannot produce a valid one
pub const FALLBACK_ARTIFACT: &str = include_str!("../assets/fallback_shell.jsx");

const MIN_ARTIFACT_CHARS: usize = 100;

static TAGGED_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:jsx|javascript|js)\s*\n([\s\S]*?)```").ok());
static BARE_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"```\s*\n([\s\S]*?)```").ok());
static COMPONENT_TAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(function\s+HermitCrab[\s\S]+)").ok());

fn first_capture(re: &LazyLock<Option<Regex>>, text: &str) -> Option<String> {
    let caps = re.as_ref()?.captures(text)?;
    Some(caps.get(1)?.as_str().trim().to_string())
}

/// Pull component source out of model output.
///
/// Tried in order: the first fenced block tagged `jsx`/`javascript`/`js`;
/// the first untagged fenced block that looks like React code; everything
/// from `function HermitCrab` to the end.
pub fn extract_artifact(text: &str) -> Option<String> {
    if let Some(code) = first_capture(&TAGGED_FENCE, text) {
        return Some(code);
    }
    if let Some(code) = first_capture(&BARE_FENCE, text) {
        if code.contains("function") && (code.contains("React") || code.contains("useState")) {
            return Some(code);
        }
    }
    first_capture(&COMPONENT_TAIL, text)
}

/// Why a component was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellRejection {
    pub reason: String,
}

impl std::fmt::Display for ShellRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for ShellRejection {}

fn reject(reason: &str) -> Result<(), ShellRejection> {
    Err(ShellRejection {
        reason: reason.into(),
    })
}

pub fn validate_artifact(src: &str) -> Result<(), ShellRejection> {
    if src.chars().count() < MIN_ARTIFACT_CHARS {
        return reject("JSX too short");
    }
    if !src.contains("HermitCrab") {
        return reject("Must define a HermitCrab function component");
    }
    if !src.contains("useState") && !src.contains("React.createElement") {
        return reject("No React patterns found");
    }
    if !src.contains("callLLM") && !src.contains("/api/chat") {
        return reject("No LLM communication found");
    }
    Ok(())
}

/// Substitute the component, version and model into the HTML wrapper.
pub fn wrap_artifact(src: &str, version: &str, model: &str) -> String {
    let model = if model.is_empty() { "unknown" } else { model };
    // Component goes in last so its text is never rescanned for placeholders.
    SHELL_WRAPPER
        .replace("__VERSION__", version)
        .replace("__MODEL__", model)
        .replace("__COMPONENT__", src)
}

/// Whether stored shell content is a renderable page
pub fn looks_like_html(content: &str) -> bool {
    content.contains("<!DOCTYPE") || content.contains("<html")
}
