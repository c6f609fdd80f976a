use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::utils::slugify;

use super::model::{TagData, TaggedStore, Task};

/// All store writes in the process serialize through one lock: the document
/// is a single file, mutations are read-modify-write, and writes happen at
/// await points where interleaving is otherwise possible.
static STORE_WRITE_LOCK: Mutex<()> = Mutex::const_new(());

/// Filesystem layout rooted at a project directory:
///
/// ```text
/// .taskmaster/tasks/tasks.json
/// .taskmaster/tasks/task_<id>[_<tag>].txt
/// .taskmaster/reports/task-complexity-report.json
/// .taskmaster/docs/research/<yyyy-mm-dd>_<slug>.md
/// ```
pub struct TaskStore {
    root: PathBuf,
}

impl TaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join(".taskmaster").join("tasks")
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.tasks_dir().join("tasks.json")
    }

    pub fn report_file(&self) -> PathBuf {
        self.root
            .join(".taskmaster")
            .join("reports")
            .join("task-complexity-report.json")
    }

    pub fn research_dir(&self) -> PathBuf {
        self.root.join(".taskmaster").join("docs").join("research")
    }

    /// Derived file name for one task. Tag `master` uses the bare name.
    pub fn task_file_name(id: u64, tag: &str) -> String {
        if tag == "master" {
            format!("task_{:03}.txt", id)
        } else {
            format!("task_{:03}_{}.txt", id, tag)
        }
    }

    pub async fn read(&self) -> anyhow::Result<TaggedStore> {
        let path = self.tasks_file();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let value: Value = serde_json::from_str(&content)?;
                TaggedStore::from_value(value)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TaggedStore::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read-modify-write one tag under the global write lock. The mutation
    /// closure runs against the whole document; the named tag is stamped and
    /// its derived files regenerated after a successful write.
    pub async fn update<R>(
        &self,
        tag: &str,
        mutate: impl FnOnce(&mut TaggedStore) -> anyhow::Result<R>,
    ) -> anyhow::Result<R> {
        let _guard = STORE_WRITE_LOCK.lock().await;
        let mut store = self.read().await?;
        let result = mutate(&mut store)?;
        store.tag_mut(tag).touch();
        self.write(&store).await?;
        self.regenerate_task_files(&store, tag).await?;
        Ok(result)
    }

    async fn write(&self, store: &TaggedStore) -> anyhow::Result<()> {
        let path = self.tasks_file();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(store)?;
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    /// Rewrite the per-task text files for one tag. Stale files for ids that
    /// no longer exist are removed first so an import never leaves orphans.
    pub async fn regenerate_task_files(
        &self,
        store: &TaggedStore,
        tag: &str,
    ) -> anyhow::Result<()> {
        let dir = self.tasks_dir();
        tokio::fs::create_dir_all(&dir).await?;

        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_task_file_for_tag(&name, tag) {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }

        let Some(data) = store.tag(tag) else {
            return Ok(());
        };
        for task in &data.tasks {
            let path = dir.join(Self::task_file_name(task.id, tag));
            tokio::fs::write(&path, render_task(task, data)).await?;
        }
        debug!(tag, count = data.tasks.len(), "Regenerated task files");
        Ok(())
    }

    pub async fn read_report(&self) -> anyhow::Result<Option<Value>> {
        match tokio::fs::read_to_string(self.report_file()).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_report(&self, report: &Value) -> anyhow::Result<PathBuf> {
        let _guard = STORE_WRITE_LOCK.lock().await;
        let path = self.report_file();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_string_pretty(report)?).await?;
        Ok(path)
    }

    /// Write a research document. Filename and content are pure functions of
    /// (date, query, body), so a re-run with identical inputs is a byte-for-
    /// byte overwrite.
    pub async fn write_research_doc(
        &self,
        date: NaiveDate,
        query: &str,
        body: &str,
    ) -> anyhow::Result<PathBuf> {
        let dir = self.research_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}_{}.md", date.format("%Y-%m-%d"), slugify(query)));
        let content = format!(
            "---\nquery: {}\ndate: {}\n---\n\n# Research: {}\n\n{}\n",
            query,
            date.format("%Y-%m-%d"),
            query,
            body.trim_end()
        );
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }
}

fn is_task_file_for_tag(name: &str, tag: &str) -> bool {
    let Some(rest) = name.strip_prefix("task_") else {
        return false;
    };
    let Some(rest) = rest.strip_suffix(".txt") else {
        return false;
    };
    if tag == "master" {
        rest.chars().all(|c| c.is_ascii_digit())
    } else {
        match rest.split_once('_') {
            Some((id, file_tag)) => {
                id.chars().all(|c| c.is_ascii_digit()) && file_tag == tag
            }
            None => false,
        }
    }
}

fn render_task(task: &Task, data: &TagData) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Task ID: {}\n", task.id));
    out.push_str(&format!("# Title: {}\n", task.title));
    out.push_str(&format!("# Status: {}\n", task.status));

    let deps: Vec<String> = task
        .dependencies
        .iter()
        .map(|dep| {
            let marker = data
                .task(*dep)
                .map(|t| if t.is_complete() { "done" } else { "pending" })
                .unwrap_or("unknown");
            format!("{} ({})", dep, marker)
        })
        .collect();
    out.push_str(&format!("# Dependencies: {}\n", deps.join(", ")));
    if let Some(priority) = task.priority {
        out.push_str(&format!("# Priority: {}\n", priority));
    }
    out.push_str(&format!("# Description: {}\n", task.description));
    if let Some(details) = &task.details {
        out.push_str("# Details:\n");
        out.push_str(details);
        out.push('\n');
    }
    if let Some(test_strategy) = &task.test_strategy {
        out.push_str("# Test Strategy:\n");
        out.push_str(test_strategy);
        out.push('\n');
    }
    if !task.subtasks.is_empty() {
        out.push_str("\n# Subtasks:\n");
        for subtask in &task.subtasks {
            out.push_str(&format!(
                "## {}. {} [{}]\n",
                subtask.id, subtask.title, subtask.status
            ));
            if !subtask.description.is_empty() {
                out.push_str(&format!("{}\n", subtask.description));
            }
            if let Some(details) = &subtask.details {
                out.push_str(details);
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::{Subtask, TaskStatus};
    use tempfile::TempDir;

    fn sample_task(id: u64) -> Task {
        Task {
            id,
            title: format!("Task {}", id),
            description: "desc".to_string(),
            status: TaskStatus::Pending,
            priority: None,
            dependencies: vec![],
            details: None,
            test_strategy: None,
            subtasks: vec![],
        }
    }

    #[tokio::test]
    async fn read_missing_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());
        assert!(store.read().await.unwrap().0.is_empty());
    }

    #[tokio::test]
    async fn update_writes_and_regenerates() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());

        store
            .update("master", |doc| {
                doc.tag_mut("master").tasks.push(sample_task(1));
                doc.tag_mut("master").tasks.push(sample_task(2));
                Ok(())
            })
            .await
            .unwrap();

        let doc = store.read().await.unwrap();
        let master = doc.tag("master").unwrap();
        assert_eq!(master.tasks.len(), 2);
        assert!(master.metadata.created.is_some());

        assert!(store.tasks_dir().join("task_001.txt").exists());
        assert!(store.tasks_dir().join("task_002.txt").exists());
    }

    #[tokio::test]
    async fn regenerate_removes_stale_files_per_tag() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());

        store
            .update("master", |doc| {
                doc.tag_mut("master").tasks.push(sample_task(1));
                doc.tag_mut("master").tasks.push(sample_task(2));
                Ok(())
            })
            .await
            .unwrap();
        store
            .update("feature", |doc| {
                doc.tag_mut("feature").tasks.push(sample_task(9));
                Ok(())
            })
            .await
            .unwrap();

        // Drop task 2 from master; its derived file must go, the feature
        // tag's file must stay.
        store
            .update("master", |doc| {
                doc.tag_mut("master").tasks.retain(|t| t.id != 2);
                Ok(())
            })
            .await
            .unwrap();

        assert!(store.tasks_dir().join("task_001.txt").exists());
        assert!(!store.tasks_dir().join("task_002.txt").exists());
        assert!(store.tasks_dir().join("task_009_feature.txt").exists());
    }

    #[tokio::test]
    async fn research_doc_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let first = store
            .write_research_doc(date, "How does JWT auth work?", "Answer.")
            .await
            .unwrap();
        let content_first = std::fs::read(&first).unwrap();

        let second = store
            .write_research_doc(date, "How does JWT auth work?", "Answer.")
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.file_name().unwrap().to_str().unwrap(),
            "2024-06-01_how-does-jwt-auth-work.md"
        );
        assert_eq!(content_first, std::fs::read(&second).unwrap());
    }

    #[test]
    fn task_file_name_tag_suffix() {
        assert_eq!(TaskStore::task_file_name(3, "master"), "task_003.txt");
        assert_eq!(
            TaskStore::task_file_name(3, "feature-x"),
            "task_003_feature-x.txt"
        );
    }

    #[test]
    fn rendered_task_marks_dependency_status() {
        let mut done = sample_task(1);
        done.status = TaskStatus::Done;
        let mut task = sample_task(2);
        task.dependencies = vec![1, 9];
        task.subtasks = vec![Subtask {
            id: 1,
            title: "first".to_string(),
            description: String::new(),
            status: TaskStatus::Pending,
            dependencies: vec![],
            details: None,
            test_strategy: None,
        }];
        let data = TagData {
            tasks: vec![done, task.clone()],
            metadata: Default::default(),
        };

        let text = render_task(&task, &data);
        assert!(text.contains("1 (done)"));
        assert!(text.contains("9 (unknown)"));
        assert!(text.contains("## 1. first [pending]"));
    }
}
