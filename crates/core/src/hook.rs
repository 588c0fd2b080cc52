//! Prompt-submit hook support: parse the host's hook payload and render
//! recalled memories as context for injection.

use crate::models::{timestamp_to_datetime, SearchResult};
use serde::Deserialize;
use std::path::Path;

const CONTEXT_OPEN: &str = "<memory-recall>";
const CONTEXT_CLOSE: &str = "</memory-recall>";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookInput {
    pub prompt: String,
    pub cwd: Option<String>,
}

#[derive(Deserialize)]
struct HookPayload {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
}

impl HookInput {
    /// Accepts a JSON payload with `prompt` and `cwd`, or treats the whole
    /// input as a plain-text prompt.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<HookPayload>(raw) {
            Ok(payload) => Self {
                prompt: payload.prompt.unwrap_or_default(),
                cwd: payload.cwd,
            },
            Err(_) => Self {
                prompt: raw.trim().to_string(),
                cwd: None,
            },
        }
    }
}

/// Project label for a working directory: its final path component, unless
/// that is the filesystem root or the user's home directory.
pub fn project_name(dir: &Path, home: Option<&Path>) -> Option<String> {
    let name = dir.file_name()?.to_str()?;
    let home_name = home.and_then(Path::file_name).and_then(|name| name.to_str());
    if name.is_empty() || home_name == Some(name) {
        return None;
    }
    Some(name.to_string())
}

/// Renders results as a numbered context block, or `None` when there is
/// nothing to inject.
pub fn render_context(results: &[SearchResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }

    let mut lines = vec![
        CONTEXT_OPEN.to_string(),
        "The following relevant memories were found from previous sessions:".to_string(),
        String::new(),
    ];

    for (index, result) in results.iter().enumerate() {
        let date = timestamp_to_datetime(result.created_at).format("%Y-%m-%d");
        let tags = if result.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", result.tags.join(", "))
        };
        lines.push(format!("{}. ({date}{tags}) {}", index + 1, result.content));
    }

    lines.push(CONTEXT_CLOSE.to_string());
    Some(lines.join("\n"))
}
