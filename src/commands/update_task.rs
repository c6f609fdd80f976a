use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::prompts;
use crate::store::TaskStore;
use crate::traits::{ServiceType, Tool, ToolContext};

use super::{CommandKit, LlmCall};

/// Update one task from a prompt. With `append`, the agent's answer is
/// treated as opaque text and appended; otherwise the agent returns the
/// whole revised task and the saver merges it under completion protection.
pub struct UpdateTaskTool {
    kit: Arc<CommandKit>,
}

impl UpdateTaskTool {
    pub fn new(kit: Arc<CommandKit>) -> Self {
        Self { kit }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskArgs {
    id: u64,
    prompt: String,
    #[serde(default)]
    append: bool,
    #[serde(default)]
    research: bool,
}

#[async_trait]
impl Tool for UpdateTaskTool {
    fn name(&self) -> &str {
        "update-one-task"
    }

    fn description(&self) -> &str {
        "Revise a single task from new information, or append a note to it."
    }

    fn schema(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": {
                "type": "object",
                "required": ["id", "prompt"],
                "properties": {
                    "id": { "type": "integer" },
                    "prompt": { "type": "string", "description": "What changed / what to incorporate" },
                    "append": { "type": "boolean", "description": "Append a timestamped note instead of rewriting the task" },
                    "research": { "type": "boolean" },
                    "tag": { "type": "string" },
                    "projectRoot": { "type": "string" }
                }
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let parsed: UpdateTaskArgs = serde_json::from_value(args.clone())?;
        let tag = self.kit.tag_of(&args);
        let root = ctx.session.resolve_project_root(&args)?;

        let task = TaskStore::new(&root)
            .read()
            .await?
            .tag(&tag)
            .and_then(|data| data.task(parsed.id).cloned())
            .ok_or_else(|| anyhow::anyhow!("Task {} not found in tag '{}'", parsed.id, tag))?;
        if task.is_complete() {
            anyhow::bail!(
                "Task {} is {}; completed tasks are never updated",
                task.id,
                task.status
            );
        }

        let role = CommandKit::role(parsed.research);
        let request = self.kit.request(
            role,
            prompts::update_task(&task, &parsed.prompt, parsed.append),
        );

        self.kit
            .execute(LlmCall {
                tool_name: "update-one-task",
                original_command: "update-task",
                role,
                service: ServiceType::GenerateText,
                request,
                hints: json!({ "append": parsed.append }),
                args: &args,
                ctx,
                tag,
            })
            .await
    }
}
