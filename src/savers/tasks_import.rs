use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::store::Task;

use super::{structured_payload, SaveInput, Saver};

/// Saver for `parse-requirements`: replaces the target tag's task list with
/// the parsed collection and regenerates the derived files.
pub struct TasksImportSaver;

#[async_trait]
impl Saver for TasksImportSaver {
    fn command(&self) -> &'static str {
        "parse-requirements"
    }

    async fn save(&self, input: SaveInput) -> anyhow::Result<Value> {
        let payload = structured_payload(&input.payload)?;
        let tasks_value = payload
            .get("tasks")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Agent payload has no 'tasks' array"))?;
        let tasks: Vec<Task> = serde_json::from_value(tasks_value)
            .map_err(|e| anyhow::anyhow!("Task list failed validation: {}", e))?;
        if tasks.is_empty() {
            anyhow::bail!("Agent returned an empty task list");
        }

        let mut seen = std::collections::HashSet::new();
        for task in &tasks {
            if !seen.insert(task.id) {
                anyhow::bail!("Duplicate task id {} in agent payload", task.id);
            }
        }

        let count = tasks.len();
        let store = input.store();
        store
            .update(&input.tag, |doc| {
                let data = doc.tag_mut(&input.tag);
                data.tasks = tasks;
                if let Some(description) = payload
                    .get("metadata")
                    .and_then(|m| m.get("description"))
                    .and_then(|d| d.as_str())
                {
                    data.metadata.description = Some(description.to_string());
                }
                Ok(())
            })
            .await?;

        info!(tag = %input.tag, count, "Imported parsed task list");
        Ok(json!({ "tasksImported": count, "tag": input.tag }))
    }
}
