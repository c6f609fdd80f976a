//! Prompt builders for the delegation-aware commands. Each returns the
//! message list handed to the provider; for a delegating provider these
//! travel verbatim inside the directive.

use crate::store::{Task, TaskPriority};
use crate::traits::ChatMessage;
use crate::utils::truncate_with_note;

const PARSE_REQUIREMENTS_SYSTEM: &str = "You are a technical project planner. Turn the supplied \
requirements document into an ordered JSON task list. Respond with a JSON object of the form \
{\"tasks\": [{id, title, description, details, testStrategy, priority, dependencies, status}], \
\"metadata\": {...}}. Ids are sequential starting at 1; dependencies reference earlier ids only; \
every status is \"pending\".";

pub fn parse_requirements(document: &str, num_tasks: Option<u32>) -> Vec<ChatMessage> {
    let count_clause = match num_tasks {
        Some(n) => format!("Produce approximately {} top-level tasks.", n),
        None => "Choose a sensible number of top-level tasks.".to_string(),
    };
    vec![
        ChatMessage::system(PARSE_REQUIREMENTS_SYSTEM),
        ChatMessage::user(format!(
            "{}\n\nRequirements document:\n\n{}",
            count_clause, document
        )),
    ]
}

const EXPAND_TASK_SYSTEM: &str = "You break a software task into concrete subtasks. Respond with \
a JSON object {\"subtasks\": [{id, title, description, details, dependencies, status}]}. Statuses \
are \"pending\"; dependencies reference sibling subtask ids only.";

pub fn expand_task(
    task: &Task,
    num_subtasks: u32,
    next_subtask_id: u64,
    extra_context: Option<&str>,
) -> Vec<ChatMessage> {
    let mut user = format!(
        "Break the following task into exactly {} subtasks, numbering them starting at {}.\n\n\
         Task {}: {}\n{}",
        num_subtasks, next_subtask_id, task.id, task.title, task.description
    );
    if let Some(details) = &task.details {
        user.push_str(&format!("\nDetails:\n{}", details));
    }
    if !task.subtasks.is_empty() {
        user.push_str(&format!(
            "\nThe task already has {} subtasks; do not repeat them.",
            task.subtasks.len()
        ));
    }
    if let Some(context) = extra_context {
        user.push_str(&format!("\nAdditional context:\n{}", context));
    }
    vec![ChatMessage::system(EXPAND_TASK_SYSTEM), ChatMessage::user(user)]
}

const ANALYZE_COMPLEXITY_SYSTEM: &str = "You estimate implementation complexity. For every task \
given, respond with a JSON array of {taskId, taskTitle, complexityScore (1-10), \
recommendedSubtasks, expansionPrompt, reasoning}.";

pub fn analyze_complexity(tasks: &[&Task], threshold: f64) -> Vec<ChatMessage> {
    let listing: Vec<String> = tasks
        .iter()
        .map(|t| format!("{}: {} — {}", t.id, t.title, t.description))
        .collect();
    vec![
        ChatMessage::system(ANALYZE_COMPLEXITY_SYSTEM),
        ChatMessage::user(format!(
            "Score these tasks. Tasks scoring {} or higher should get an expansionPrompt.\n\n{}",
            threshold,
            listing.join("\n")
        )),
    ]
}

const UPDATE_TASK_SYSTEM: &str = "You revise a software task from new information. Respond with \
the complete updated task as a JSON object, keeping every field you do not change. Never alter \
subtasks whose status is done or completed.";

pub fn update_task(task: &Task, prompt: &str, append: bool) -> Vec<ChatMessage> {
    if append {
        return vec![
            ChatMessage::system(
                "You write concise implementation notes. Respond with plain text only.",
            ),
            ChatMessage::user(format!(
                "Task {}: {}\n\nWrite a note covering: {}",
                task.id, task.title, prompt
            )),
        ];
    }
    let task_json = serde_json::to_string_pretty(task).unwrap_or_default();
    vec![
        ChatMessage::system(UPDATE_TASK_SYSTEM),
        ChatMessage::user(format!(
            "Current task:\n{}\n\nUpdate it based on: {}",
            task_json, prompt
        )),
    ]
}

pub fn update_subtask(parent: &Task, subtask_id: u64, prompt: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You write focused progress notes for a subtask. Respond with plain text only; no \
             JSON, no headings.",
        ),
        ChatMessage::user(format!(
            "Parent task {}: {}\nSubtask {}.{}\n\nNew information to record: {}",
            parent.id, parent.title, parent.id, subtask_id, prompt
        )),
    ]
}

const UPDATE_TASKS_SYSTEM: &str = "You revise several software tasks from new information. \
Respond with a JSON array of complete updated task objects, in the same order. Keep ids \
unchanged; skip nothing; never alter subtasks whose status is done or completed.";

pub fn update_tasks(tasks: &[&Task], prompt: &str) -> Vec<ChatMessage> {
    let tasks_json = serde_json::to_string_pretty(
        &tasks.iter().map(|t| (*t).clone()).collect::<Vec<_>>(),
    )
    .unwrap_or_default();
    vec![
        ChatMessage::system(UPDATE_TASKS_SYSTEM),
        ChatMessage::user(format!(
            "Current tasks:\n{}\n\nUpdate them based on: {}",
            tasks_json, prompt
        )),
    ]
}

const ADD_TASK_SYSTEM: &str = "You draft one new software task. Respond with a JSON object \
{title, description, details, testStrategy, dependencies}. Dependencies may only reference the \
existing task ids you were shown.";

pub fn add_task(
    prompt: &str,
    new_task_id: u64,
    existing: &[&Task],
    priority: Option<TaskPriority>,
) -> Vec<ChatMessage> {
    let listing: Vec<String> = existing
        .iter()
        .map(|t| format!("{}: {}", t.id, t.title))
        .collect();
    let mut user = format!(
        "Draft task {} for this request: {}\n\nExisting tasks:\n{}",
        new_task_id,
        prompt,
        if listing.is_empty() {
            "(none)".to_string()
        } else {
            listing.join("\n")
        }
    );
    if let Some(priority) = priority {
        user.push_str(&format!("\nRequested priority: {}", priority));
    }
    vec![ChatMessage::system(ADD_TASK_SYSTEM), ChatMessage::user(user)]
}

/// Context cap per gathered item so the directive stays a reasonable size.
const RESEARCH_CONTEXT_CHARS: usize = 4_000;

pub fn research(
    query: &str,
    detail_level: &str,
    task_context: &[String],
    file_context: &[(String, String)],
    custom_context: Option<&str>,
) -> Vec<ChatMessage> {
    let length_clause = match detail_level {
        "low" => "Answer in a few short paragraphs.",
        "high" => "Answer exhaustively, with sections and examples.",
        _ => "Answer thoroughly but stay focused.",
    };
    let mut user = format!("{}\n\nResearch question: {}", length_clause, query);
    if !task_context.is_empty() {
        user.push_str("\n\nProject tasks for context:\n");
        user.push_str(&task_context.join("\n"));
    }
    for (path, content) in file_context {
        user.push_str(&format!(
            "\n\nFile {}:\n{}",
            path,
            truncate_with_note(content, RESEARCH_CONTEXT_CHARS)
        ));
    }
    if let Some(context) = custom_context {
        user.push_str(&format!("\n\nAdditional context:\n{}", context));
    }
    vec![
        ChatMessage::system(
            "You are a senior engineer doing project-grounded research. Cite the supplied \
             context where it is relevant. Respond in Markdown.",
        ),
        ChatMessage::user(user),
    ]
}
