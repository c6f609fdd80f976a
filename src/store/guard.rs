//! Completed-item protection, centralized because every task-mutating saver
//! enforces the same rule: a task or subtask whose status is `done` or
//! `completed` is never overwritten. Violations are warnings, not failures.

use super::model::Task;

/// Result of merging an agent-proposed replacement over an existing task.
pub struct MergeOutcome {
    pub task: Task,
    /// Human-readable notes about anything the guard restored or refused.
    pub warnings: Vec<String>,
}

/// Merge `proposed` over `existing` while honoring completion protection:
///
/// - A completed task is returned untouched (the proposal is discarded).
/// - Any pre-existing completed subtask is restored verbatim if the proposal
///   modified or removed it.
/// - The task id always stays the existing one; agents do not renumber.
pub fn preserve_completed(existing: &Task, proposed: Task) -> MergeOutcome {
    let mut warnings = Vec::new();

    if existing.is_complete() {
        warnings.push(format!(
            "Task {} is {}; update skipped",
            existing.id, existing.status
        ));
        return MergeOutcome {
            task: existing.clone(),
            warnings,
        };
    }

    let mut task = proposed;
    if task.id != existing.id {
        warnings.push(format!(
            "Proposed task id {} ignored; keeping {}",
            task.id, existing.id
        ));
        task.id = existing.id;
    }

    for original in &existing.subtasks {
        if !original.status.is_complete() {
            continue;
        }
        match task.subtask_mut(original.id) {
            Some(replacement) if replacement == original => {}
            Some(replacement) => {
                warnings.push(format!(
                    "Subtask {}.{} is {}; restored original content",
                    existing.id, original.id, original.status
                ));
                *replacement = original.clone();
            }
            None => {
                warnings.push(format!(
                    "Subtask {}.{} is {}; restored after removal",
                    existing.id, original.id, original.status
                ));
                task.subtasks.push(original.clone());
            }
        }
    }
    task.subtasks.sort_by_key(|s| s.id);

    MergeOutcome { task, warnings }
}
