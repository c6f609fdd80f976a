use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::prompts;
use crate::store::TaskStore;
use crate::traits::{ServiceType, Tool, ToolContext};

use super::{CommandKit, LlmCall};

/// Project-grounded research. Context is gathered host-side (tasks, files)
/// and fused into the prompt; where to persist the answer travels as hints.
pub struct ResearchTool {
    kit: Arc<CommandKit>,
}

impl ResearchTool {
    pub fn new(kit: Arc<CommandKit>) -> Self {
        Self { kit }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResearchArgs {
    query: String,
    #[serde(default)]
    task_ids: Vec<String>,
    #[serde(default)]
    file_paths: Vec<String>,
    #[serde(default)]
    custom_context: Option<String>,
    #[serde(default)]
    detail_level: Option<String>,
    #[serde(default)]
    save_to: Option<String>,
    #[serde(default)]
    save_to_file: bool,
    /// yyyy-mm-dd; defaults to today at save time. Fixing it here keeps the
    /// generated document name reproducible.
    #[serde(default)]
    query_date: Option<String>,
}

#[async_trait]
impl Tool for ResearchTool {
    fn name(&self) -> &str {
        "research"
    }

    fn description(&self) -> &str {
        "Answer a research question with project context, optionally saving the result."
    }

    fn schema(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": {
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": { "type": "string" },
                    "taskIds": { "type": "array", "items": { "type": "string" }, "description": "Tasks ('7') or subtasks ('7.2') to include as context" },
                    "filePaths": { "type": "array", "items": { "type": "string" }, "description": "Project files to include as context" },
                    "customContext": { "type": "string" },
                    "detailLevel": { "enum": ["low", "medium", "high"] },
                    "saveTo": { "type": "string", "description": "Task or subtask id to attach the result to" },
                    "saveToFile": { "type": "boolean", "description": "Also write a Markdown document under .taskmaster/docs/research" },
                    "queryDate": { "type": "string", "description": "yyyy-mm-dd used in the document name" },
                    "tag": { "type": "string" },
                    "projectRoot": { "type": "string" }
                }
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let parsed: ResearchArgs = serde_json::from_value(args.clone())?;
        let tag = self.kit.tag_of(&args);
        let root = ctx.session.resolve_project_root(&args)?;

        let doc = TaskStore::new(&root).read().await?;
        let mut task_context = Vec::new();
        if let Some(data) = doc.tag(&tag) {
            for id in &parsed.task_ids {
                let found = match id.split_once('.') {
                    Some((parent, sub)) => parent
                        .parse::<u64>()
                        .ok()
                        .and_then(|p| data.task(p))
                        .and_then(|task| {
                            let sub_id: u64 = sub.parse().ok()?;
                            let subtask = task.subtask(sub_id)?;
                            Some(format!(
                                "{}.{} {}: {}",
                                task.id, subtask.id, subtask.title, subtask.description
                            ))
                        }),
                    None => id.parse::<u64>().ok().and_then(|task_id| {
                        data.task(task_id)
                            .map(|t| format!("{} {}: {}", t.id, t.title, t.description))
                    }),
                };
                match found {
                    Some(line) => task_context.push(line),
                    None => warn!(id = %id, "Research context task not found; skipping"),
                }
            }
        }

        let mut file_context = Vec::new();
        for path in &parsed.file_paths {
            let full = root.join(path);
            match tokio::fs::read_to_string(&full).await {
                Ok(content) => file_context.push((path.clone(), content)),
                Err(e) => warn!(path = %full.display(), "Research context file unreadable: {}", e),
            }
        }

        let detail_level = parsed.detail_level.as_deref().unwrap_or("medium").to_string();
        // Research defaults to the research role regardless of flags.
        let role = CommandKit::role(true);
        let request = self.kit.request(
            role,
            prompts::research(
                &parsed.query,
                &detail_level,
                &task_context,
                &file_context,
                parsed.custom_context.as_deref(),
            ),
        );

        let mut hints = json!({
            "query": parsed.query,
            "saveToFile": parsed.save_to_file,
            "detailLevel": detail_level,
        });
        if let Some(save_to) = &parsed.save_to {
            hints["saveTo"] = json!(save_to);
        }
        if let Some(query_date) = &parsed.query_date {
            hints["queryDate"] = json!(query_date);
        }

        self.kit
            .execute(LlmCall {
                tool_name: "research",
                original_command: "research",
                role,
                service: ServiceType::GenerateText,
                request,
                hints,
                args: &args,
                ctx,
                tag,
            })
            .await
    }
}
