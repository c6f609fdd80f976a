use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::prompts;
use crate::store::TaskStore;
use crate::traits::{ServiceType, Tool, ToolContext};

use super::{CommandKit, LlmCall};

const DEFAULT_SUBTASKS: u32 = 5;

/// Expand a task into subtasks. `force` clears existing subtasks before the
/// delegation is issued, so the saver only ever appends.
pub struct ExpandTaskTool {
    kit: Arc<CommandKit>,
}

impl ExpandTaskTool {
    pub fn new(kit: Arc<CommandKit>) -> Self {
        Self { kit }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpandTaskArgs {
    id: u64,
    #[serde(default)]
    num: Option<u32>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    research: bool,
}

fn subtasks_schema() -> Value {
    json!({
        "type": "object",
        "required": ["subtasks"],
        "properties": {
            "subtasks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "title"],
                    "properties": {
                        "id": { "type": "integer" },
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "details": { "type": "string" },
                        "dependencies": { "type": "array" },
                        "status": { "type": "string" },
                    },
                },
            },
        },
    })
}

#[async_trait]
impl Tool for ExpandTaskTool {
    fn name(&self) -> &str {
        "expand-task"
    }

    fn description(&self) -> &str {
        "Break a task into subtasks, appending after any that already exist."
    }

    fn schema(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": {
                "type": "object",
                "required": ["id"],
                "properties": {
                    "id": { "type": "integer", "description": "Task to expand" },
                    "num": { "type": "integer", "description": "How many subtasks to generate" },
                    "prompt": { "type": "string", "description": "Extra context for the expansion" },
                    "force": { "type": "boolean", "description": "Clear existing subtasks first" },
                    "research": { "type": "boolean" },
                    "tag": { "type": "string" },
                    "projectRoot": { "type": "string" }
                }
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let parsed: ExpandTaskArgs = serde_json::from_value(args.clone())?;
        let tag = self.kit.tag_of(&args);
        let root = ctx.session.resolve_project_root(&args)?;
        let store = TaskStore::new(&root);

        let task = if parsed.force {
            // Clearing is part of the command, not the saver: by the time the
            // agent answers, the slate is already clean.
            store
                .update(&tag, |doc| {
                    let task = doc
                        .tag_mut(&tag)
                        .task_mut(parsed.id)
                        .ok_or_else(|| anyhow::anyhow!("Task {} not found in tag '{}'", parsed.id, tag))?;
                    if !task.subtasks.is_empty() {
                        info!(task = parsed.id, cleared = task.subtasks.len(), "Cleared subtasks for forced expansion");
                        task.subtasks.clear();
                    }
                    Ok(task.clone())
                })
                .await?
        } else {
            store
                .read()
                .await?
                .tag(&tag)
                .and_then(|data| data.task(parsed.id).cloned())
                .ok_or_else(|| anyhow::anyhow!("Task {} not found in tag '{}'", parsed.id, tag))?
        };

        let num_subtasks = parsed.num.unwrap_or(DEFAULT_SUBTASKS);
        let next_subtask_id = task.next_subtask_id();

        let role = CommandKit::role(parsed.research);
        let mut request = self.kit.request(
            role,
            prompts::expand_task(&task, num_subtasks, next_subtask_id, parsed.prompt.as_deref()),
        );
        request.schema = Some(subtasks_schema());
        request.object_name = Some("subtasks".to_string());

        self.kit
            .execute(LlmCall {
                tool_name: "expand-task",
                original_command: "expand-task",
                role,
                service: ServiceType::GenerateObject,
                request,
                hints: json!({
                    "nextSubtaskId": next_subtask_id,
                    "numSubtasksForAgent": num_subtasks,
                }),
                args: &args,
                ctx,
                tag,
            })
            .await
    }
}
