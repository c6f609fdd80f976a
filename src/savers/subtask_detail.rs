use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::utils::{dated_marker, timestamped_block};

use super::{text_payload, SaveInput, Saver};

/// Prompts shorter than this also stamp the subtask description, so a quick
/// note stays visible without opening the details.
const SHORT_PROMPT_CHARS: usize = 100;

/// Saver for `update-one-subtask`: wraps the agent's text in a timestamped
/// block and appends it to the subtask details. Completed subtasks are left
/// alone.
pub struct SubtaskDetailSaver;

#[async_trait]
impl Saver for SubtaskDetailSaver {
    fn command(&self) -> &'static str {
        "update-one-subtask"
    }

    async fn save(&self, input: SaveInput) -> anyhow::Result<Value> {
        let id = input
            .original_args
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Original args carry no subtask id"))?;
        let (parent_id, subtask_id) = parse_subtask_id(id)?;
        let prompt_len = input
            .original_args
            .get("prompt")
            .and_then(|v| v.as_str())
            .map(|p| p.chars().count())
            .unwrap_or(0);

        let block = timestamped_block(&text_payload(&input.payload), Utc::now());
        let store = input.store();
        let appended = store
            .update(&input.tag, |doc| {
                let task = doc
                    .tag_mut(&input.tag)
                    .task_mut(parent_id)
                    .ok_or_else(|| anyhow::anyhow!("Task {} not found", parent_id))?;
                let subtask = task.subtask_mut(subtask_id).ok_or_else(|| {
                    anyhow::anyhow!("Subtask {}.{} not found", parent_id, subtask_id)
                })?;
                if subtask.status.is_complete() {
                    warn!(
                        subtask = %format!("{}.{}", parent_id, subtask_id),
                        "Subtask is completed; details not appended"
                    );
                    return Ok(false);
                }
                subtask.append_details(&block);
                if prompt_len > 0 && prompt_len < SHORT_PROMPT_CHARS {
                    subtask.description.push_str(&dated_marker(Utc::now()));
                }
                Ok(true)
            })
            .await?;

        info!(
            subtask = %format!("{}.{}", parent_id, subtask_id),
            appended,
            "Recorded subtask progress"
        );
        Ok(json!({
            "taskId": parent_id,
            "subtaskId": subtask_id,
            "appended": appended,
        }))
    }
}

fn parse_subtask_id(id: &str) -> anyhow::Result<(u64, u64)> {
    let (parent, sub) = id
        .split_once('.')
        .ok_or_else(|| anyhow::anyhow!("Subtask id must be 'parentId.subtaskId', got '{}'", id))?;
    Ok((parent.parse()?, sub.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::DelegatedCallDetails;
    use crate::store::{Subtask, Task, TaskStatus, TaskStore};
    use crate::traits::ServiceType;
    use tempfile::TempDir;

    async fn seed(root: &std::path::Path, status: TaskStatus) {
        TaskStore::new(root)
            .update("master", |doc| {
                doc.tag_mut("master").tasks.push(Task {
                    id: 5,
                    title: "Parent".to_string(),
                    description: String::new(),
                    status: TaskStatus::Pending,
                    priority: None,
                    dependencies: vec![],
                    details: None,
                    test_strategy: None,
                    subtasks: vec![Subtask {
                        id: 2,
                        title: "sub".to_string(),
                        description: "desc".to_string(),
                        status,
                        dependencies: vec![],
                        details: Some("OLD".to_string()),
                        test_strategy: None,
                    }],
                });
                Ok(())
            })
            .await
            .unwrap();
    }

    fn input(root: &std::path::Path, prompt: &str) -> SaveInput {
        SaveInput {
            payload: json!("progress note"),
            original_args: json!({ "id": "5.2", "prompt": prompt }),
            details: DelegatedCallDetails {
                original_command: "update-subtask".to_string(),
                role: "main".to_string(),
                service_type: ServiceType::GenerateText,
                request_parameters: json!({}),
            },
            project_root: root.to_path_buf(),
            tag: "master".to_string(),
        }
    }

    #[tokio::test]
    async fn appends_block_and_marks_short_prompt() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), TaskStatus::Pending).await;

        SubtaskDetailSaver
            .save(input(dir.path(), "quick note"))
            .await
            .unwrap();

        let doc = TaskStore::new(dir.path()).read().await.unwrap();
        let task = doc.tag("master").unwrap().task(5).unwrap().clone();
        let subtask = task.subtask(2).unwrap();
        let details = subtask.details.as_deref().unwrap();
        assert!(details.starts_with("OLD"));
        assert!(details.contains("progress note"));
        assert!(subtask.description.contains("[Updated:"));
    }

    #[tokio::test]
    async fn long_prompt_leaves_description_alone() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), TaskStatus::Pending).await;

        let long_prompt = "p".repeat(200);
        SubtaskDetailSaver
            .save(input(dir.path(), &long_prompt))
            .await
            .unwrap();

        let doc = TaskStore::new(dir.path()).read().await.unwrap();
        let task = doc.tag("master").unwrap().task(5).unwrap().clone();
        assert_eq!(task.subtask(2).unwrap().description, "desc");
    }

    #[tokio::test]
    async fn completed_subtask_is_untouched() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), TaskStatus::Done).await;

        let result = SubtaskDetailSaver
            .save(input(dir.path(), "note"))
            .await
            .unwrap();
        assert_eq!(result["appended"], false);

        let doc = TaskStore::new(dir.path()).read().await.unwrap();
        let task = doc.tag("master").unwrap().task(5).unwrap().clone();
        assert_eq!(task.subtask(2).unwrap().details.as_deref(), Some("OLD"));
    }

    #[test]
    fn dotted_id_parsing() {
        assert_eq!(parse_subtask_id("5.2").unwrap(), (5, 2));
        assert!(parse_subtask_id("5").is_err());
        assert!(parse_subtask_id("a.b").is_err());
    }
}
