use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::utils::timestamped_block;

use super::{text_payload, SaveInput, Saver};

/// Saver for `research`: optionally writes the result to a Markdown document
/// under the docs directory, and optionally appends it to a target task or
/// subtask as a timestamped block.
pub struct ResearchSaver;

#[async_trait]
impl Saver for ResearchSaver {
    fn command(&self) -> &'static str {
        "research"
    }

    async fn save(&self, input: SaveInput) -> anyhow::Result<Value> {
        let text = text_payload(&input.payload);
        let query = input
            .hint("query")
            .and_then(|v| v.as_str())
            .or_else(|| input.original_args.get("query").and_then(|v| v.as_str()))
            .ok_or_else(|| anyhow::anyhow!("No query to derive the research artifacts from"))?
            .to_string();

        let mut result = json!({ "query": query });
        let store = input.store();

        let save_to_file = input
            .hint("saveToFile")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if save_to_file {
            let date = input
                .hint("queryDate")
                .and_then(|v| v.as_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .unwrap_or_else(|| Utc::now().date_naive());
            let path = store.write_research_doc(date, &query, &text).await?;
            info!(path = %path.display(), "Saved research document");
            result["filePath"] = json!(path.to_string_lossy());
        }

        if let Some(target) = input.hint("saveTo").and_then(|v| v.as_str()) {
            let block = timestamped_block(&text, Utc::now());
            let saved = append_to_target(&store, &input.tag, target, &block).await?;
            result["savedTo"] = json!(if saved { Some(target) } else { None });
        }

        Ok(result)
    }
}

/// Append a research block to `target` ("7" for a task, "7.2" for a
/// subtask). Completed items are skipped with a warning, never failed.
async fn append_to_target(
    store: &crate::store::TaskStore,
    tag: &str,
    target: &str,
    block: &str,
) -> anyhow::Result<bool> {
    let (task_id, subtask_id) = match target.split_once('.') {
        Some((parent, sub)) => (parent.parse::<u64>()?, Some(sub.parse::<u64>()?)),
        None => (target.parse::<u64>()?, None),
    };

    store
        .update(tag, |doc| {
            let task = doc
                .tag_mut(tag)
                .task_mut(task_id)
                .ok_or_else(|| anyhow::anyhow!("Task {} not found", task_id))?;
            match subtask_id {
                None => {
                    if task.is_complete() {
                        warn!(task = task_id, "Task is completed; research not attached");
                        return Ok(false);
                    }
                    task.append_details(block);
                    Ok(true)
                }
                Some(sub) => {
                    if task.is_complete() {
                        warn!(task = task_id, "Parent is completed; research not attached");
                        return Ok(false);
                    }
                    let subtask = task
                        .subtask_mut(sub)
                        .ok_or_else(|| anyhow::anyhow!("Subtask {}.{} not found", task_id, sub))?;
                    if subtask.status.is_complete() {
                        warn!(
                            subtask = %format!("{}.{}", task_id, sub),
                            "Subtask is completed; research not attached"
                        );
                        return Ok(false);
                    }
                    subtask.append_details(block);
                    Ok(true)
                }
            }
        })
        .await
}
