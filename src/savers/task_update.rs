use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::store::{preserve_completed, Task};
use crate::utils::timestamped_block;

use super::{structured_payload, text_payload, SaveInput, Saver};

/// Saver for `update-one-task`. Two modes, selected by the original call's
/// `append` flag:
///
/// - append: the agent payload is opaque text, appended to the task details
///   as a timestamped block.
/// - full update: the payload is a complete task object, merged over the
///   existing task with completed subtasks restored verbatim.
pub struct TaskUpdateSaver;

#[async_trait]
impl Saver for TaskUpdateSaver {
    fn command(&self) -> &'static str {
        "update-one-task"
    }

    async fn save(&self, input: SaveInput) -> anyhow::Result<Value> {
        let task_id = input
            .original_args
            .get("id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow::anyhow!("Original args carry no task id"))?;
        let append = input
            .original_args
            .get("append")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let store = input.store();
        if append {
            let block = timestamped_block(&text_payload(&input.payload), Utc::now());
            let updated = store
                .update(&input.tag, |doc| {
                    let task = doc
                        .tag_mut(&input.tag)
                        .task_mut(task_id)
                        .ok_or_else(|| anyhow::anyhow!("Task {} not found", task_id))?;
                    if task.is_complete() {
                        warn!(task = task_id, "Task is completed; note not appended");
                        return Ok(false);
                    }
                    task.append_details(&block);
                    Ok(true)
                })
                .await?;
            info!(task = task_id, appended = updated, "Appended task note");
            return Ok(json!({ "taskId": task_id, "appended": updated }));
        }

        let proposed: Task = serde_json::from_value(structured_payload(&input.payload)?)
            .map_err(|e| anyhow::anyhow!("Updated task failed validation: {}", e))?;
        let warnings = store
            .update(&input.tag, |doc| {
                let data = doc.tag_mut(&input.tag);
                let existing = data
                    .task(task_id)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("Task {} not found", task_id))?;
                let outcome = preserve_completed(&existing, proposed);
                *data.task_mut(task_id).expect("task present") = outcome.task;
                Ok(outcome.warnings)
            })
            .await?;
        for warning in &warnings {
            warn!(task = task_id, "{}", warning);
        }

        info!(task = task_id, tag = %input.tag, "Updated task");
        Ok(json!({ "taskId": task_id, "warnings": warnings }))
    }
}
