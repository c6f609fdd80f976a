use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::prompts;
use crate::store::{Task, TaskPriority, TaskStore};
use crate::traits::{ServiceType, Tool, ToolContext};

use super::{CommandKit, LlmCall};

/// Draft and add one new task. The id is reserved at delegation time and
/// travels as a hint, so the saver can refuse a collision instead of
/// silently renumbering.
pub struct AddTaskTool {
    kit: Arc<CommandKit>,
}

impl AddTaskTool {
    pub fn new(kit: Arc<CommandKit>) -> Self {
        Self { kit }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTaskArgs {
    prompt: String,
    #[serde(default)]
    dependencies: Vec<u64>,
    #[serde(default)]
    priority: Option<TaskPriority>,
    #[serde(default)]
    research: bool,
}

fn task_draft_schema() -> Value {
    json!({
        "type": "object",
        "required": ["title", "description"],
        "properties": {
            "title": { "type": "string" },
            "description": { "type": "string" },
            "details": { "type": "string" },
            "testStrategy": { "type": "string" },
            "dependencies": { "type": "array", "items": { "type": "integer" } },
        },
    })
}

#[async_trait]
impl Tool for AddTaskTool {
    fn name(&self) -> &str {
        "add-task"
    }

    fn description(&self) -> &str {
        "Draft a new task from a prompt and append it to the task list."
    }

    fn schema(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": {
                "type": "object",
                "required": ["prompt"],
                "properties": {
                    "prompt": { "type": "string", "description": "What the new task should accomplish" },
                    "dependencies": { "type": "array", "items": { "type": "integer" } },
                    "priority": { "enum": ["high", "medium", "low"] },
                    "research": { "type": "boolean" },
                    "tag": { "type": "string" },
                    "projectRoot": { "type": "string" }
                }
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let parsed: AddTaskArgs = serde_json::from_value(args.clone())?;
        let tag = self.kit.tag_of(&args);
        let root = ctx.session.resolve_project_root(&args)?;

        let doc = TaskStore::new(&root).read().await?;
        let (new_task_id, existing): (u64, Vec<Task>) = match doc.tag(&tag) {
            Some(data) => (data.next_task_id(), data.tasks.clone()),
            None => (1, Vec::new()),
        };
        let existing_refs: Vec<&Task> = existing.iter().collect();

        let role = CommandKit::role(parsed.research);
        let mut request = self.kit.request(
            role,
            prompts::add_task(&parsed.prompt, new_task_id, &existing_refs, parsed.priority),
        );
        request.schema = Some(task_draft_schema());
        request.object_name = Some("newTask".to_string());

        self.kit
            .execute(LlmCall {
                tool_name: "add-task",
                original_command: "add-task",
                role,
                service: ServiceType::GenerateObject,
                request,
                hints: json!({
                    "newTaskId": new_task_id,
                    "userDependencies": parsed.dependencies,
                    "userPriority": parsed.priority,
                }),
                args: &args,
                ctx,
                tag,
            })
            .await
    }
}
