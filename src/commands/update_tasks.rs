use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::prompts;
use crate::store::{Task, TaskStore};
use crate::traits::{ServiceType, Tool, ToolContext};

use super::{CommandKit, LlmCall};

/// Bulk update: revise every not-yet-complete task from `from` onward in one
/// agent pass.
pub struct UpdateTasksTool {
    kit: Arc<CommandKit>,
}

impl UpdateTasksTool {
    pub fn new(kit: Arc<CommandKit>) -> Self {
        Self { kit }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTasksArgs {
    from: u64,
    prompt: String,
    #[serde(default)]
    research: bool,
}

fn updated_tasks_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "required": ["id", "title"],
            "properties": {
                "id": { "type": "integer" },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "details": { "type": "string" },
                "testStrategy": { "type": "string" },
                "dependencies": { "type": "array", "items": { "type": "integer" } },
                "status": { "type": "string" },
                "subtasks": { "type": "array" },
            },
        },
    })
}

#[async_trait]
impl Tool for UpdateTasksTool {
    fn name(&self) -> &str {
        "update-many-tasks"
    }

    fn description(&self) -> &str {
        "Revise all pending tasks from a given id onward based on new information."
    }

    fn schema(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": {
                "type": "object",
                "required": ["from", "prompt"],
                "properties": {
                    "from": { "type": "integer", "description": "First task id to include" },
                    "prompt": { "type": "string", "description": "What changed" },
                    "research": { "type": "boolean" },
                    "tag": { "type": "string" },
                    "projectRoot": { "type": "string" }
                }
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let parsed: UpdateTasksArgs = serde_json::from_value(args.clone())?;
        let tag = self.kit.tag_of(&args);
        let root = ctx.session.resolve_project_root(&args)?;

        let doc = TaskStore::new(&root).read().await?;
        let data = doc
            .tag(&tag)
            .ok_or_else(|| anyhow::anyhow!("Tag '{}' has no tasks", tag))?;
        let selected: Vec<&Task> = data
            .tasks
            .iter()
            .filter(|task| task.id >= parsed.from && !task.is_complete())
            .collect();
        if selected.is_empty() {
            anyhow::bail!(
                "No updatable tasks at or after id {} in tag '{}' (completed tasks are skipped)",
                parsed.from,
                tag
            );
        }

        let role = CommandKit::role(parsed.research);
        let mut request = self
            .kit
            .request(role, prompts::update_tasks(&selected, &parsed.prompt));
        request.schema = Some(updated_tasks_schema());
        request.object_name = Some("tasks".to_string());

        self.kit
            .execute(LlmCall {
                tool_name: "update-many-tasks",
                original_command: "update-tasks",
                role,
                service: ServiceType::GenerateObject,
                request,
                hints: json!({ "from": parsed.from }),
                args: &args,
                ctx,
                tag,
            })
            .await
    }
}
