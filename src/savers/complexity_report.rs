use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use super::{structured_payload, SaveInput, Saver};

/// Saver for `analyze-complexity`: persists the analysis report. A scoped
/// run (explicit ids or an id range in the original call) merges into the
/// existing report; an unscoped run overwrites it.
pub struct ComplexityReportSaver;

#[async_trait]
impl Saver for ComplexityReportSaver {
    fn command(&self) -> &'static str {
        "analyze-complexity"
    }

    async fn save(&self, input: SaveInput) -> anyhow::Result<Value> {
        let payload = structured_payload(&input.payload)?;
        let items = payload
            .get("complexityAnalysis")
            .cloned()
            .unwrap_or(payload.clone());
        let items = items
            .as_array()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Agent payload is not an analysis array"))?;
        for item in &items {
            if item.get("taskId").and_then(|v| v.as_u64()).is_none() {
                anyhow::bail!("Analysis item missing numeric taskId: {}", item);
            }
            if item.get("complexityScore").and_then(|v| v.as_f64()).is_none() {
                anyhow::bail!("Analysis item missing complexityScore: {}", item);
            }
        }

        let scoped = input.hint("ids").is_some()
            || input.hint("from").is_some()
            || input.hint("to").is_some();

        let store = input.store();
        let mut analysis = if scoped {
            let existing = store
                .read_report()
                .await?
                .and_then(|r| r.get("complexityAnalysis").cloned())
                .and_then(|a| a.as_array().cloned())
                .unwrap_or_default();
            // Keep prior entries for tasks outside this run's scope.
            let new_ids: Vec<u64> = items
                .iter()
                .filter_map(|i| i.get("taskId").and_then(|v| v.as_u64()))
                .collect();
            let mut merged: Vec<Value> = existing
                .into_iter()
                .filter(|item| {
                    item.get("taskId")
                        .and_then(|v| v.as_u64())
                        .map(|id| !new_ids.contains(&id))
                        .unwrap_or(false)
                })
                .collect();
            merged.extend(items.clone());
            merged
        } else {
            items.clone()
        };
        analysis.sort_by_key(|item| item.get("taskId").and_then(|v| v.as_u64()).unwrap_or(0));

        let threshold = input
            .hint("threshold")
            .and_then(|v| v.as_f64())
            .unwrap_or(5.0);
        let used_research = input
            .hint("usedResearch")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let report = json!({
            "meta": {
                "generatedAt": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                "tasksAnalyzed": items.len(),
                "thresholdScore": threshold,
                "usedResearch": used_research,
            },
            "complexityAnalysis": analysis,
        });

        let path = store.write_report(&report).await?;
        info!(
            analyzed = items.len(),
            merged = scoped,
            path = %path.display(),
            "Wrote complexity report"
        );
        Ok(json!({
            "reportPath": path.to_string_lossy(),
            "tasksAnalyzed": items.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::DelegatedCallDetails;
    use crate::store::TaskStore;
    use crate::traits::ServiceType;
    use tempfile::TempDir;

    fn input(root: &std::path::Path, payload: Value, hints: Value) -> SaveInput {
        SaveInput {
            payload,
            original_args: json!({}),
            details: DelegatedCallDetails {
                original_command: "analyze-complexity".to_string(),
                role: "main".to_string(),
                service_type: ServiceType::GenerateObject,
                request_parameters: hints,
            },
            project_root: root.to_path_buf(),
            tag: "master".to_string(),
        }
    }

    fn item(task_id: u64, score: f64) -> Value {
        json!({ "taskId": task_id, "complexityScore": score, "reasoning": "r" })
    }

    #[tokio::test]
    async fn unscoped_run_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());

        ComplexityReportSaver
            .save(input(dir.path(), json!([item(1, 3.0), item(2, 8.0)]), json!({})))
            .await
            .unwrap();
        ComplexityReportSaver
            .save(input(dir.path(), json!([item(3, 5.0)]), json!({})))
            .await
            .unwrap();

        let report = store.read_report().await.unwrap().unwrap();
        let analysis = report["complexityAnalysis"].as_array().unwrap();
        assert_eq!(analysis.len(), 1);
        assert_eq!(analysis[0]["taskId"], 3);
        assert_eq!(report["meta"]["tasksAnalyzed"], 1);
    }

    #[tokio::test]
    async fn scoped_run_merges_by_task_id() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());

        ComplexityReportSaver
            .save(input(dir.path(), json!([item(1, 3.0), item(2, 8.0)]), json!({})))
            .await
            .unwrap();
        // Re-analyze only task 2.
        ComplexityReportSaver
            .save(input(
                dir.path(),
                json!([item(2, 6.0)]),
                json!({ "ids": "2", "threshold": 7.0 }),
            ))
            .await
            .unwrap();

        let report = store.read_report().await.unwrap().unwrap();
        let analysis = report["complexityAnalysis"].as_array().unwrap();
        assert_eq!(analysis.len(), 2);
        assert_eq!(analysis[0]["taskId"], 1);
        assert_eq!(analysis[1]["complexityScore"], 6.0);
        assert_eq!(report["meta"]["thresholdScore"], 7.0);
    }

    #[tokio::test]
    async fn rejects_items_without_score() {
        let dir = TempDir::new().unwrap();
        let bad = json!([{ "taskId": 1 }]);
        assert!(ComplexityReportSaver
            .save(input(dir.path(), bad, json!({})))
            .await
            .is_err());
    }
}
