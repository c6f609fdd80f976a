use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::prompts;
use crate::store::TaskStore;
use crate::traits::{ServiceType, Tool, ToolContext};

use super::{CommandKit, LlmCall};

/// Append agent-written progress notes to one subtask, addressed as
/// `parentId.subtaskId`.
pub struct UpdateSubtaskTool {
    kit: Arc<CommandKit>,
}

impl UpdateSubtaskTool {
    pub fn new(kit: Arc<CommandKit>) -> Self {
        Self { kit }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSubtaskArgs {
    id: String,
    prompt: String,
    #[serde(default)]
    research: bool,
}

#[async_trait]
impl Tool for UpdateSubtaskTool {
    fn name(&self) -> &str {
        "update-one-subtask"
    }

    fn description(&self) -> &str {
        "Append timestamped progress notes to a subtask's details."
    }

    fn schema(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": {
                "type": "object",
                "required": ["id", "prompt"],
                "properties": {
                    "id": { "type": "string", "description": "Dotted subtask id, e.g. '5.2'" },
                    "prompt": { "type": "string", "description": "New information to record" },
                    "research": { "type": "boolean" },
                    "tag": { "type": "string" },
                    "projectRoot": { "type": "string" }
                }
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let parsed: UpdateSubtaskArgs = serde_json::from_value(args.clone())?;
        let tag = self.kit.tag_of(&args);
        let root = ctx.session.resolve_project_root(&args)?;

        let (parent_id, subtask_id) = parsed
            .id
            .split_once('.')
            .and_then(|(p, s)| Some((p.parse::<u64>().ok()?, s.parse::<u64>().ok()?)))
            .ok_or_else(|| {
                anyhow::anyhow!("Subtask id must be 'parentId.subtaskId', got '{}'", parsed.id)
            })?;

        let parent = TaskStore::new(&root)
            .read()
            .await?
            .tag(&tag)
            .and_then(|data| data.task(parent_id).cloned())
            .ok_or_else(|| anyhow::anyhow!("Task {} not found in tag '{}'", parent_id, tag))?;
        let subtask = parent.subtask(subtask_id).ok_or_else(|| {
            anyhow::anyhow!("Subtask {}.{} not found", parent_id, subtask_id)
        })?;
        if subtask.status.is_complete() {
            anyhow::bail!(
                "Subtask {}.{} is {}; completed subtasks are never updated",
                parent_id,
                subtask_id,
                subtask.status
            );
        }

        let role = CommandKit::role(parsed.research);
        let request = self.kit.request(
            role,
            prompts::update_subtask(&parent, subtask_id, &parsed.prompt),
        );

        self.kit
            .execute(LlmCall {
                tool_name: "update-one-subtask",
                original_command: "update-subtask",
                role,
                service: ServiceType::GenerateText,
                request,
                hints: json!({}),
                args: &args,
                ctx,
                tag,
            })
            .await
    }
}
