use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::prompts;
use crate::store::{TaskStore, Task};
use crate::traits::{ServiceType, Tool, ToolContext};

use super::{CommandKit, LlmCall};

const DEFAULT_THRESHOLD: f64 = 5.0;

/// Score task complexity. Scoping (explicit ids or an id range) is carried
/// as hints so the saver merges into the existing report instead of
/// overwriting it.
pub struct AnalyzeComplexityTool {
    kit: Arc<CommandKit>,
}

impl AnalyzeComplexityTool {
    pub fn new(kit: Arc<CommandKit>) -> Self {
        Self { kit }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeComplexityArgs {
    #[serde(default)]
    ids: Option<String>,
    #[serde(default)]
    from: Option<u64>,
    #[serde(default)]
    to: Option<u64>,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    research: bool,
}

fn analysis_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "required": ["taskId", "complexityScore"],
            "properties": {
                "taskId": { "type": "integer" },
                "taskTitle": { "type": "string" },
                "complexityScore": { "type": "number", "minimum": 1, "maximum": 10 },
                "recommendedSubtasks": { "type": "integer" },
                "expansionPrompt": { "type": "string" },
                "reasoning": { "type": "string" },
            },
        },
    })
}

fn parse_id_list(ids: &str) -> anyhow::Result<Vec<u64>> {
    ids.split(',')
        .map(|part| {
            part.trim()
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("Invalid task id '{}' in ids list", part.trim()))
        })
        .collect()
}

#[async_trait]
impl Tool for AnalyzeComplexityTool {
    fn name(&self) -> &str {
        "analyze-complexity"
    }

    fn description(&self) -> &str {
        "Score implementation complexity for tasks and persist the analysis report."
    }

    fn schema(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": {
                "type": "object",
                "properties": {
                    "ids": { "type": "string", "description": "Comma-separated task ids to analyze" },
                    "from": { "type": "integer", "description": "First id of an inclusive range" },
                    "to": { "type": "integer", "description": "Last id of an inclusive range" },
                    "threshold": { "type": "number", "description": "Score at and above which expansion is recommended" },
                    "research": { "type": "boolean" },
                    "tag": { "type": "string" },
                    "projectRoot": { "type": "string" }
                }
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let parsed: AnalyzeComplexityArgs = serde_json::from_value(args.clone())?;
        let tag = self.kit.tag_of(&args);
        let root = ctx.session.resolve_project_root(&args)?;

        let doc = TaskStore::new(&root).read().await?;
        let data = doc
            .tag(&tag)
            .ok_or_else(|| anyhow::anyhow!("Tag '{}' has no tasks to analyze", tag))?;

        let id_filter: Option<Vec<u64>> = parsed.ids.as_deref().map(parse_id_list).transpose()?;
        let selected: Vec<&Task> = data
            .tasks
            .iter()
            .filter(|task| match &id_filter {
                Some(ids) => ids.contains(&task.id),
                None => {
                    parsed.from.map(|from| task.id >= from).unwrap_or(true)
                        && parsed.to.map(|to| task.id <= to).unwrap_or(true)
                }
            })
            .collect();
        if selected.is_empty() {
            anyhow::bail!("No tasks match the requested scope in tag '{}'", tag);
        }

        let threshold = parsed.threshold.unwrap_or(DEFAULT_THRESHOLD);
        let role = CommandKit::role(parsed.research);
        let mut request = self
            .kit
            .request(role, prompts::analyze_complexity(&selected, threshold));
        request.schema = Some(analysis_schema());
        request.object_name = Some("complexityAnalysis".to_string());

        let mut hints = json!({
            "threshold": threshold,
            "usedResearch": parsed.research,
        });
        if let Some(ids) = &parsed.ids {
            hints["ids"] = json!(ids);
        }
        if let Some(from) = parsed.from {
            hints["from"] = json!(from);
        }
        if let Some(to) = parsed.to {
            hints["to"] = json!(to);
        }

        self.kit
            .execute(LlmCall {
                tool_name: "analyze-complexity",
                original_command: "analyze-complexity",
                role,
                service: ServiceType::GenerateObject,
                request,
                hints,
                args: &args,
                ctx,
                tag,
            })
            .await
    }
}
