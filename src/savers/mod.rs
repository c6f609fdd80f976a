//! Post-processors (savers): one per delegation-capable command. Each turns
//! the agent's free-form completion into a validated mutation of the task
//! store. Savers never touch the interaction registry, and their failures
//! never reach the agent ack path.

mod bulk_update;
mod complexity_report;
mod new_task;
mod research_doc;
mod subtask_detail;
mod subtasks;
mod task_update;
mod tasks_import;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use bulk_update::BulkUpdateSaver;
pub use complexity_report::ComplexityReportSaver;
pub use new_task::NewTaskSaver;
pub use research_doc::ResearchSaver;
pub use subtask_detail::SubtaskDetailSaver;
pub use subtasks::SubtasksSaver;
pub use task_update::TaskUpdateSaver;
pub use tasks_import::TasksImportSaver;

use crate::interaction::DelegatedCallDetails;
use crate::store::TaskStore;

/// Everything a saver gets: the agent payload, the original command args
/// verbatim, the directive details (for hint recovery), and where to write.
pub struct SaveInput {
    pub payload: Value,
    pub original_args: Value,
    pub details: DelegatedCallDetails,
    pub project_root: PathBuf,
    pub tag: String,
}

impl SaveInput {
    /// Recover a command hint carried in the directive's request parameters.
    pub fn hint(&self, key: &str) -> Option<&Value> {
        self.details.request_parameters.get(key)
    }

    pub fn store(&self) -> TaskStore {
        TaskStore::new(&self.project_root)
    }
}

#[async_trait]
pub trait Saver: Send + Sync {
    /// The tool name this saver is keyed on.
    fn command(&self) -> &'static str;

    async fn save(&self, input: SaveInput) -> anyhow::Result<Value>;
}

/// Static table from original tool name to saver, with aliases resolved
/// through the directive's `originalCommand` for commands that share a tool.
pub struct SaverRegistry {
    by_tool: HashMap<&'static str, Arc<dyn Saver>>,
    aliases: HashMap<&'static str, &'static str>,
}

impl SaverRegistry {
    /// The full standard table: every delegation-capable command has exactly
    /// one entry.
    pub fn standard() -> Self {
        let savers: Vec<Arc<dyn Saver>> = vec![
            Arc::new(TasksImportSaver),
            Arc::new(SubtasksSaver),
            Arc::new(ComplexityReportSaver),
            Arc::new(TaskUpdateSaver),
            Arc::new(SubtaskDetailSaver),
            Arc::new(BulkUpdateSaver),
            Arc::new(NewTaskSaver),
            Arc::new(ResearchSaver),
        ];
        let mut by_tool = HashMap::new();
        for saver in savers {
            by_tool.insert(saver.command(), saver);
        }
        // The bulk command label differs from its tool name.
        let mut aliases = HashMap::new();
        aliases.insert("update-tasks", "update-many-tasks");
        Self { by_tool, aliases }
    }

    pub fn lookup(
        &self,
        tool_name: &str,
        original_command: &str,
    ) -> Option<Arc<dyn Saver>> {
        if let Some(saver) = self.by_tool.get(tool_name) {
            return Some(saver.clone());
        }
        let target = self.aliases.get(original_command)?;
        self.by_tool.get(target).cloned()
    }
}

/// Normalize an agent payload that should be structured: objects pass
/// through, strings are parsed as JSON (with Markdown code fences stripped).
pub(crate) fn structured_payload(payload: &Value) -> anyhow::Result<Value> {
    match payload {
        Value::String(s) => {
            let trimmed = strip_code_fence(s);
            serde_json::from_str(trimmed)
                .map_err(|e| anyhow::anyhow!("Agent payload is not valid JSON: {}", e))
        }
        other => Ok(other.clone()),
    }
}

/// Normalize an agent payload that should be plain text. Objects with a
/// conventional text field unwrap; anything else serializes.
pub(crate) fn text_payload(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => {
            for key in ["text", "content", "result"] {
                if let Some(s) = other.get(key).and_then(|v| v.as_str()) {
                    return s.to_string();
                }
            }
            other.to_string()
        }
    }
}

fn strip_code_fence(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "javascript", ...) on the opening fence.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").map(str::trim).unwrap_or(rest).trim()
}
