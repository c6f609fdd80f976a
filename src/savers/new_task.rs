use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::store::{Subtask, Task, TaskPriority, TaskStatus};

use super::{structured_payload, SaveInput, Saver};

/// Saver for `add-task`: composes a new task from the agent's draft plus the
/// id/dependency/priority hints fixed at delegation time. Refuses id
/// collisions outright — the id was reserved when the directive was issued.
pub struct NewTaskSaver;

#[async_trait]
impl Saver for NewTaskSaver {
    fn command(&self) -> &'static str {
        "add-task"
    }

    async fn save(&self, input: SaveInput) -> anyhow::Result<Value> {
        let draft = structured_payload(&input.payload)?;
        let title = draft
            .get("title")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Agent draft has no title"))?
            .to_string();

        let store = input.store();
        let new_id = match input.hint("newTaskId").and_then(|v| v.as_u64()) {
            Some(id) => id,
            None => store
                .read()
                .await?
                .tag(&input.tag)
                .map(|data| data.next_task_id())
                .unwrap_or(1),
        };
        let user_dependencies: Vec<u64> = input
            .hint("userDependencies")
            .and_then(|v| v.as_array())
            .map(|deps| deps.iter().filter_map(|d| d.as_u64()).collect())
            .unwrap_or_default();
        let user_priority: Option<TaskPriority> = input
            .hint("userPriority")
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        let agent_dependencies: Vec<u64> = draft
            .get("dependencies")
            .and_then(|v| v.as_array())
            .map(|deps| deps.iter().filter_map(|d| d.as_u64()).collect())
            .unwrap_or_default();
        let subtasks: Vec<Subtask> = draft
            .get("subtasks")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let task = Task {
            id: new_id,
            title,
            description: draft
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            status: TaskStatus::Pending,
            priority: user_priority.or_else(|| {
                draft
                    .get("priority")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
            }),
            dependencies: Vec::new(),
            details: draft
                .get("details")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            test_strategy: draft
                .get("testStrategy")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            subtasks,
        };

        let task_id = store
            .update(&input.tag, |doc| {
                let data = doc.tag_mut(&input.tag);
                if data.task(new_id).is_some() {
                    anyhow::bail!("Task id {} already exists in tag '{}'", new_id, input.tag);
                }

                // User-supplied dependencies win; the agent's are additive.
                // Unknown ids are dropped with a warning rather than written.
                let mut dependencies = Vec::new();
                for dep in user_dependencies.iter().chain(agent_dependencies.iter()) {
                    if dependencies.contains(dep) {
                        continue;
                    }
                    if data.task(*dep).is_some() {
                        dependencies.push(*dep);
                    } else {
                        warn!(task = new_id, dependency = dep, "Dropping unknown dependency");
                    }
                }

                let mut task = task;
                task.dependencies = dependencies;
                data.tasks.push(task);
                data.tasks.sort_by_key(|t| t.id);
                Ok(new_id)
            })
            .await?;

        info!(task = task_id, tag = %input.tag, "Added task");
        Ok(json!({ "taskId": task_id }))
    }
}
