use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::store::{preserve_completed, Task};

use super::{structured_payload, SaveInput, Saver};

/// Saver for `update-many-tasks`: applies the single-task merge rules to
/// every task in the agent's array. Ids missing from the store are reported
/// but do not abort the batch.
pub struct BulkUpdateSaver;

#[async_trait]
impl Saver for BulkUpdateSaver {
    fn command(&self) -> &'static str {
        "update-many-tasks"
    }

    async fn save(&self, input: SaveInput) -> anyhow::Result<Value> {
        let payload = structured_payload(&input.payload)?;
        let list = payload.get("tasks").cloned().unwrap_or(payload.clone());
        let proposed: Vec<Task> = serde_json::from_value(list)
            .map_err(|e| anyhow::anyhow!("Updated task list failed validation: {}", e))?;
        if proposed.is_empty() {
            anyhow::bail!("Agent returned no tasks to update");
        }

        let store = input.store();
        let (updated, missing, warnings) = store
            .update(&input.tag, |doc| {
                let data = doc.tag_mut(&input.tag);
                let mut updated = Vec::new();
                let mut missing = Vec::new();
                let mut warnings = Vec::new();
                for task in proposed {
                    let Some(existing) = data.task(task.id).cloned() else {
                        missing.push(task.id);
                        continue;
                    };
                    let outcome = preserve_completed(&existing, task);
                    let id = outcome.task.id;
                    *data.task_mut(id).expect("task present") = outcome.task;
                    warnings.extend(outcome.warnings);
                    updated.push(id);
                }
                Ok((updated, missing, warnings))
            })
            .await?;

        for warning in &warnings {
            warn!(tag = %input.tag, "{}", warning);
        }
        if !missing.is_empty() {
            warn!(tag = %input.tag, ?missing, "Agent updated ids not present in the store");
        }
        info!(
            tag = %input.tag,
            updated = updated.len(),
            missing = missing.len(),
            "Applied bulk task update"
        );
        Ok(json!({ "updated": updated, "missing": missing, "warnings": warnings }))
    }
}
