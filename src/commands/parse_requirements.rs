use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::prompts;
use crate::store::TaskStore;
use crate::traits::{ServiceType, Tool, ToolContext};

use super::{CommandKit, LlmCall};

const DEFAULT_INPUT: &str = ".taskmaster/docs/prd.txt";

/// Parse a requirements document into a fresh task list for one tag.
pub struct ParseRequirementsTool {
    kit: Arc<CommandKit>,
}

impl ParseRequirementsTool {
    pub fn new(kit: Arc<CommandKit>) -> Self {
        Self { kit }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParseRequirementsArgs {
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    num_tasks: Option<u32>,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    research: bool,
}

fn tasks_schema() -> Value {
    json!({
        "type": "object",
        "required": ["tasks"],
        "properties": {
            "tasks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "title", "description"],
                    "properties": {
                        "id": { "type": "integer" },
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "details": { "type": "string" },
                        "testStrategy": { "type": "string" },
                        "priority": { "enum": ["high", "medium", "low"] },
                        "dependencies": { "type": "array", "items": { "type": "integer" } },
                        "status": { "type": "string" },
                    },
                },
            },
            "metadata": { "type": "object" },
        },
    })
}

#[async_trait]
impl Tool for ParseRequirementsTool {
    fn name(&self) -> &str {
        "parse-requirements"
    }

    fn description(&self) -> &str {
        "Parse a requirements document into an ordered task list."
    }

    fn schema(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": {
                "type": "object",
                "properties": {
                    "input": { "type": "string", "description": "Path to the requirements document (default .taskmaster/docs/prd.txt)" },
                    "numTasks": { "type": "integer", "description": "Approximate number of top-level tasks to generate" },
                    "force": { "type": "boolean", "description": "Overwrite an existing task list for the tag" },
                    "research": { "type": "boolean", "description": "Use the research role" },
                    "tag": { "type": "string" },
                    "projectRoot": { "type": "string" }
                }
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let parsed: ParseRequirementsArgs = serde_json::from_value(args.clone())?;
        let tag = self.kit.tag_of(&args);
        let root = ctx.session.resolve_project_root(&args)?;

        let input_path = match &parsed.input {
            Some(path) => {
                let path = PathBuf::from(path);
                if path.is_absolute() {
                    path
                } else {
                    root.join(path)
                }
            }
            None => root.join(DEFAULT_INPUT),
        };
        let document = tokio::fs::read_to_string(&input_path).await.map_err(|e| {
            anyhow::anyhow!(
                "Cannot read requirements document '{}': {}",
                input_path.display(),
                e
            )
        })?;
        if document.trim().is_empty() {
            anyhow::bail!(
                "Requirements document '{}' is empty",
                input_path.display()
            );
        }

        let existing = TaskStore::new(&root).read().await?;
        let existing_count = existing.tag(&tag).map(|d| d.tasks.len()).unwrap_or(0);
        if existing_count > 0 && !parsed.force {
            anyhow::bail!(
                "Tag '{}' already has {} tasks. Pass force=true to overwrite them.",
                tag,
                existing_count
            );
        }

        let role = CommandKit::role(parsed.research);
        let mut request = self
            .kit
            .request(role, prompts::parse_requirements(&document, parsed.num_tasks));
        request.schema = Some(tasks_schema());
        request.object_name = Some("tasks".to_string());

        self.kit
            .execute(LlmCall {
                tool_name: "parse-requirements",
                original_command: "parse-prd",
                role,
                service: ServiceType::GenerateObject,
                request,
                hints: json!({ "numTasks": parsed.num_tasks }),
                args: &args,
                ctx,
                tag,
            })
            .await
    }
}
