use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::store::Subtask;

use super::{structured_payload, SaveInput, Saver};

/// Saver for `expand-task`: appends the agent's subtasks to the parent,
/// numbering them from the `nextSubtaskId` hint so pre-existing subtasks are
/// never renumbered or displaced. Any `force` clearing happened before
/// delegation, so this path only ever appends.
pub struct SubtasksSaver;

#[async_trait]
impl Saver for SubtasksSaver {
    fn command(&self) -> &'static str {
        "expand-task"
    }

    async fn save(&self, input: SaveInput) -> anyhow::Result<Value> {
        let parent_id = input
            .original_args
            .get("id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow::anyhow!("Original args carry no parent task id"))?;

        let payload = structured_payload(&input.payload)?;
        let list = payload
            .get("subtasks")
            .cloned()
            .unwrap_or(payload.clone());
        let mut subtasks: Vec<Subtask> = serde_json::from_value(list)
            .map_err(|e| anyhow::anyhow!("Subtask list failed validation: {}", e))?;
        if subtasks.is_empty() {
            anyhow::bail!("Agent returned no subtasks");
        }

        let hinted_start = input.hint("nextSubtaskId").and_then(|v| v.as_u64());
        let store = input.store();
        let appended = store
            .update(&input.tag, |doc| {
                let data = doc.tag_mut(&input.tag);
                let task = data
                    .task_mut(parent_id)
                    .ok_or_else(|| anyhow::anyhow!("Task {} not found", parent_id))?;
                if task.is_complete() {
                    warn!(task = parent_id, "Parent task is completed; subtasks not added");
                    return Ok(0);
                }

                // The hint was computed at delegation time; fall back to the
                // live store if it somehow did not travel.
                let start = hinted_start.unwrap_or_else(|| task.next_subtask_id());
                for (index, subtask) in subtasks.iter_mut().enumerate() {
                    subtask.id = start + index as u64;
                }
                let count = subtasks.len();
                task.subtasks.append(&mut subtasks);
                task.subtasks.sort_by_key(|s| s.id);
                Ok(count)
            })
            .await?;

        info!(task = parent_id, appended, tag = %input.tag, "Expanded task");
        Ok(json!({ "taskId": parent_id, "subtasksAdded": appended }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::DelegatedCallDetails;
    use crate::store::{TagData, TaskStatus, TaskStore};
    use crate::traits::ServiceType;
    use tempfile::TempDir;

    async fn seed(root: &std::path::Path, subtask_count: u64) {
        let store = TaskStore::new(root);
        store
            .update("master", |doc| {
                let data: &mut TagData = doc.tag_mut("master");
                data.tasks.push(crate::store::Task {
                    id: 7,
                    title: "Parent".to_string(),
                    description: String::new(),
                    status: TaskStatus::Pending,
                    priority: None,
                    dependencies: vec![],
                    details: None,
                    test_strategy: None,
                    subtasks: (1..=subtask_count)
                        .map(|i| Subtask {
                            id: i,
                            title: format!("existing {}", i),
                            description: String::new(),
                            status: TaskStatus::Pending,
                            dependencies: vec![],
                            details: None,
                            test_strategy: None,
                        })
                        .collect(),
                });
                Ok(())
            })
            .await
            .unwrap();
    }

    fn input(root: &std::path::Path, payload: Value, next_id: u64) -> SaveInput {
        SaveInput {
            payload,
            original_args: json!({ "id": 7, "num": 3 }),
            details: DelegatedCallDetails {
                original_command: "expand-task".to_string(),
                role: "main".to_string(),
                service_type: ServiceType::GenerateObject,
                request_parameters: json!({
                    "nextSubtaskId": next_id,
                    "numSubtasksForAgent": 3,
                }),
            },
            project_root: root.to_path_buf(),
            tag: "master".to_string(),
        }
    }

    #[tokio::test]
    async fn appends_with_hinted_numbering() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), 2).await;

        // Agent numbered them 1..3; the hint says the range starts at 3.
        let payload = json!({
            "subtasks": [
                { "id": 1, "title": "new a" },
                { "id": 2, "title": "new b" },
                { "id": 3, "title": "new c" },
            ],
        });
        let result = SubtasksSaver
            .save(input(dir.path(), payload, 3))
            .await
            .unwrap();
        assert_eq!(result["subtasksAdded"], 3);

        let doc = TaskStore::new(dir.path()).read().await.unwrap();
        let task = doc.tag("master").unwrap().task(7).unwrap().clone();
        let ids: Vec<u64> = task.subtasks.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(task.subtask(1).unwrap().title, "existing 1");
        assert_eq!(task.subtask(5).unwrap().title, "new c");
    }

    #[tokio::test]
    async fn accepts_bare_array_payload() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), 0).await;
        let payload = json!([{ "id": 1, "title": "only" }]);
        let result = SubtasksSaver
            .save(input(dir.path(), payload, 1))
            .await
            .unwrap();
        assert_eq!(result["subtasksAdded"], 1);
    }

    #[tokio::test]
    async fn completed_parent_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());
        store
            .update("master", |doc| {
                doc.tag_mut("master").tasks.push(crate::store::Task {
                    id: 7,
                    title: "Done parent".to_string(),
                    description: String::new(),
                    status: TaskStatus::Done,
                    priority: None,
                    dependencies: vec![],
                    details: None,
                    test_strategy: None,
                    subtasks: vec![],
                });
                Ok(())
            })
            .await
            .unwrap();

        let payload = json!([{ "id": 1, "title": "ignored" }]);
        let result = SubtasksSaver
            .save(input(dir.path(), payload, 1))
            .await
            .unwrap();
        assert_eq!(result["subtasksAdded"], 0);

        let doc = store.read().await.unwrap();
        assert!(doc.tag("master").unwrap().task(7).unwrap().subtasks.is_empty());
    }

    #[tokio::test]
    async fn unknown_parent_fails() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), 0).await;
        let mut bad = input(dir.path(), json!([{ "id": 1, "title": "x" }]), 1);
        bad.original_args = json!({ "id": 99 });
        assert!(SubtasksSaver.save(bad).await.is_err());
    }
}
