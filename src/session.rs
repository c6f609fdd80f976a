//! Caller sessions and project-root resolution.
//!
//! Every tool invocation arrives with a session: the caller's identity plus
//! an optional default project root. Commands and savers resolve the root
//! from the invocation args first (an explicit `projectRoot` always wins),
//! then fall back to the session. Centralizing the lookup keeps the
//! resolution order consistent across every command.

use std::path::{Path, PathBuf};

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    project_root: Option<PathBuf>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_root: None,
        }
    }

    pub fn with_project_root(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            project_root: Some(root.into()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resolve the project root for one invocation. Args take precedence over
    /// the session default; a relative or missing root is an error because
    /// every persisted path hangs off it.
    pub fn resolve_project_root(&self, args: &Value) -> anyhow::Result<PathBuf> {
        if let Some(root) = args.get("projectRoot").and_then(|v| v.as_str()) {
            let path = Path::new(root);
            if !path.is_absolute() {
                anyhow::bail!("projectRoot must be an absolute path, got '{}'", root);
            }
            return Ok(path.to_path_buf());
        }
        if let Some(root) = &self.project_root {
            return Ok(root.clone());
        }
        anyhow::bail!(
            "No project root: pass projectRoot in the tool args or configure the session"
        )
    }
}
