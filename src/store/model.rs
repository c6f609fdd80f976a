use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Completed,
    Review,
    Deferred,
    Cancelled,
}

impl TaskStatus {
    /// `done` and `completed` items are protected: no saver may overwrite
    /// them.
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Completed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Done => "done",
            TaskStatus::Completed => "completed",
            TaskStatus::Review => "review",
            TaskStatus::Deferred => "deferred",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Low => "low",
        };
        write!(f, "{}", s)
    }
}

/// Subtask dependencies may reference siblings by number or other tasks by
/// dotted string ("5.2"), so they stay as raw JSON values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_strategy: Option<String>,
}

impl Subtask {
    pub fn append_details(&mut self, block: &str) {
        match &mut self.details {
            Some(details) if !details.is_empty() => {
                details.push_str("\n\n");
                details.push_str(block);
            }
            _ => self.details = Some(block.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<Subtask>,
}

impl Task {
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    /// Next id for an appended subtask: one past the highest existing id, so
    /// numbering survives deletions without reuse.
    pub fn next_subtask_id(&self) -> u64 {
        self.subtasks.iter().map(|s| s.id).max().unwrap_or(0) + 1
    }

    pub fn subtask(&self, id: u64) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    pub fn subtask_mut(&mut self, id: u64) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }

    pub fn append_details(&mut self, block: &str) {
        match &mut self.details {
            Some(details) if !details.is_empty() => {
                details.push_str("\n\n");
                details.push_str(block);
            }
            _ => self.details = Some(block.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TagMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TagData {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub metadata: TagMetadata,
}

impl TagData {
    pub fn task(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: u64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn next_task_id(&self) -> u64 {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    /// Stamp the metadata on mutation; `created` is set once.
    pub fn touch(&mut self) {
        let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        if self.metadata.created.is_none() {
            self.metadata.created = Some(now.clone());
        }
        self.metadata.updated = Some(now);
    }
}

/// The whole store document: a mapping from tag name to its task list.
/// Canonical on-disk shape is `{ [tagName]: { tasks, metadata } }`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(transparent)]
pub struct TaggedStore(pub BTreeMap<String, TagData>);

impl TaggedStore {
    pub fn tag(&self, name: &str) -> Option<&TagData> {
        self.0.get(name)
    }

    pub fn tag_mut(&mut self, name: &str) -> &mut TagData {
        self.0.entry(name.to_string()).or_default()
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    /// Parse a store document, accepting the legacy flat single-tag form
    /// (`{ tasks, metadata }`) and normalizing it to tag `master`. The flat
    /// form is an input-only adapter; it is never written back.
    pub fn from_value(value: Value) -> anyhow::Result<Self> {
        if let Some(obj) = value.as_object() {
            if obj.get("tasks").map(|t| t.is_array()).unwrap_or(false) {
                let data: TagData = serde_json::from_value(value)?;
                let mut store = TaggedStore::default();
                store.0.insert("master".to_string(), data);
                return Ok(store);
            }
        }
        Ok(serde_json::from_value(value)?)
    }
}
