//! End-to-end tests that drive the full channel: command core → delegation
//! signal → directive dispatch → agent callback → post-processing, with the
//! real wrapper, registry, broker, and store in the loop.

use serde_json::json;

use crate::config::AppConfig;
use crate::store::{Subtask, Task, TaskStatus};
use crate::testing::{
    interaction_id_of, setup_harness, setup_harness_with, setup_harness_with_provider,
    setup_harness_without_broker, FixedResultTool, ScriptedProvider, TestHarness,
};

fn task(id: u64, title: &str, status: TaskStatus) -> Task {
    Task {
        id,
        title: title.to_string(),
        description: format!("{} description", title),
        status,
        priority: None,
        dependencies: vec![],
        details: None,
        test_strategy: None,
        subtasks: vec![],
    }
}

fn subtask(id: u64, title: &str, status: TaskStatus, details: Option<&str>) -> Subtask {
    Subtask {
        id,
        title: title.to_string(),
        description: String::new(),
        status,
        dependencies: vec![],
        details: details.map(str::to_string),
        test_strategy: None,
    }
}

async fn seed(harness: &TestHarness, tag: &str, tasks: Vec<Task>) {
    harness
        .store()
        .update(tag, |doc| {
            doc.tag_mut(tag).tasks = tasks;
            Ok(())
        })
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Scenario 1: parse-requirements happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn parse_requirements_full_round_trip() {
    let harness = setup_harness().await;
    tokio::fs::write(harness.root.path().join("prd.md"), "Build a CLI with auth and sync.")
        .await
        .unwrap();

    let signal = harness
        .invoke("parse-requirements", json!({ "input": "prd.md", "numTasks": 3 }))
        .await
        .unwrap();
    assert_eq!(signal["needsAgentDelegation"], true);
    let details = &signal["pendingInteraction"]["delegatedCallDetails"];
    assert_eq!(details["originalCommand"], "parse-prd");
    assert_eq!(details["serviceType"], "generate_object");
    assert_eq!(details["requestParameters"]["numTasks"], 3);

    let id = interaction_id_of(&signal);
    assert_eq!(harness.registry().len(), 1);

    let ack = harness
        .agent_success(
            &id,
            json!({
                "tasks": [
                    { "id": 1, "title": "A", "description": "a" },
                    { "id": 2, "title": "B", "description": "b" },
                    { "id": 3, "title": "C", "description": "c" },
                ],
                "metadata": {},
            }),
        )
        .await;
    assert_eq!(ack["status"], "agent_response_processed_by_taskmaster");
    assert_eq!(ack["interactionId"], json!(id));
    assert!(harness.registry().is_empty(), "registry balanced after resolution");

    let store = harness.store();
    let persisted = harness
        .eventually(|| async {
            store
                .read()
                .await
                .ok()
                .and_then(|doc| doc.tag("master").map(|d| d.tasks.len() == 3))
                .unwrap_or(false)
        })
        .await;
    assert!(persisted, "imported tasks should land in tasks.json");
    for name in ["task_001.txt", "task_002.txt", "task_003.txt"] {
        assert!(store.tasks_dir().join(name).exists(), "missing {}", name);
    }
}

// ---------------------------------------------------------------------------
// Scenario 2: update-one-task append mode with completed-subtask protection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn append_update_preserves_completed_subtask() {
    let harness = setup_harness().await;
    let mut parent = task(5, "Five", TaskStatus::Pending);
    parent.subtasks = vec![
        subtask(1, "one", TaskStatus::Pending, None),
        subtask(2, "two", TaskStatus::Done, Some("OLD")),
    ];
    seed(&harness, "master", vec![parent]).await;

    let signal = harness
        .invoke(
            "update-one-task",
            json!({ "id": 5, "append": true, "prompt": "note" }),
        )
        .await
        .unwrap();
    let id = interaction_id_of(&signal);
    assert_eq!(
        signal["pendingInteraction"]["delegatedCallDetails"]["requestParameters"]["append"],
        true
    );

    harness.agent_success(&id, json!("extra context")).await;

    let store = harness.store();
    let appended = harness
        .eventually(|| async {
            store
                .read()
                .await
                .ok()
                .and_then(|doc| {
                    let task = doc.tag("master")?.task(5)?.clone();
                    Some(
                        task.details
                            .as_deref()
                            .map(|d| d.contains("extra context"))
                            .unwrap_or(false),
                    )
                })
                .unwrap_or(false)
        })
        .await;
    assert!(appended);

    let doc = store.read().await.unwrap();
    let task = doc.tag("master").unwrap().task(5).unwrap().clone();
    assert!(task.details.as_deref().unwrap().contains("<info added on"));
    assert_eq!(task.subtask(2).unwrap().details.as_deref(), Some("OLD"));
    assert_eq!(task.subtask(1).unwrap(), &subtask(1, "one", TaskStatus::Pending, None));
}

// ---------------------------------------------------------------------------
// Scenario 3: expand-task hint recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expand_task_numbers_from_hint() {
    let harness = setup_harness().await;
    let mut parent = task(7, "Seven", TaskStatus::Pending);
    parent.subtasks = vec![
        subtask(1, "existing 1", TaskStatus::Pending, None),
        subtask(2, "existing 2", TaskStatus::Done, None),
    ];
    seed(&harness, "master", vec![parent]).await;

    let signal = harness
        .invoke("expand-task", json!({ "id": 7, "num": 3 }))
        .await
        .unwrap();
    let params = &signal["pendingInteraction"]["delegatedCallDetails"]["requestParameters"];
    // Hints are present in the directive at delegation time...
    assert_eq!(params["nextSubtaskId"], 3);
    assert_eq!(params["numSubtasksForAgent"], 3);
    assert_eq!(params["tagInfo"]["tag"], "master");
    let id = interaction_id_of(&signal);

    // ...drive the saver on resumption: the agent numbered from 1, the store
    // numbers from the hint.
    harness
        .agent_success(
            &id,
            json!({
                "subtasks": [
                    { "id": 1, "title": "new a" },
                    { "id": 2, "title": "new b" },
                    { "id": 3, "title": "new c" },
                ],
            }),
        )
        .await;

    let store = harness.store();
    let expanded = harness
        .eventually(|| async {
            store
                .read()
                .await
                .ok()
                .and_then(|doc| Some(doc.tag("master")?.task(7)?.subtasks.len() == 5))
                .unwrap_or(false)
        })
        .await;
    assert!(expanded);

    let doc = store.read().await.unwrap();
    let task = doc.tag("master").unwrap().task(7).unwrap().clone();
    let ids: Vec<u64> = task.subtasks.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(task.subtask(1).unwrap().title, "existing 1");
    assert_eq!(task.subtask(3).unwrap().title, "new a");
    assert_eq!(task.subtask(5).unwrap().title, "new c");
}

// ---------------------------------------------------------------------------
// Unknown interaction ids and single-shot resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_interaction_id_is_rejected() {
    let harness = setup_harness().await;
    let response = harness.agent_success("ghost", json!({ "x": 1 })).await;
    assert_eq!(response["error"]["code"], "ERR_UNKNOWN_INTERACTION");
    assert_eq!(response["interactionId"], "ghost");
    assert!(!harness.root.path().join(".taskmaster").exists());
}

#[tokio::test]
async fn second_callback_for_same_id_is_rejected() {
    let harness = setup_harness().await;
    tokio::fs::write(harness.root.path().join("prd.md"), "One feature.")
        .await
        .unwrap();

    let signal = harness
        .invoke("parse-requirements", json!({ "input": "prd.md" }))
        .await
        .unwrap();
    let id = interaction_id_of(&signal);

    let payload = json!({ "tasks": [{ "id": 1, "title": "A", "description": "a" }] });
    let first = harness.agent_success(&id, payload.clone()).await;
    assert_eq!(first["status"], "agent_response_processed_by_taskmaster");

    let second = harness.agent_success(&id, payload).await;
    assert_eq!(second["error"]["code"], "ERR_UNKNOWN_INTERACTION");
}

// ---------------------------------------------------------------------------
// Scenario 5: dispatch failure rejects the pending record
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_broker_rejects_record() {
    let harness = setup_harness_without_broker().await;
    tokio::fs::write(harness.root.path().join("prd.md"), "One feature.")
        .await
        .unwrap();

    let signal = harness
        .invoke("parse-requirements", json!({ "input": "prd.md" }))
        .await
        .unwrap();
    // Even with dispatch doomed, the caller still sees the untouched signal.
    assert_eq!(signal["needsAgentDelegation"], true);
    let id = interaction_id_of(&signal);

    let receiver = harness
        .registry()
        .subscribe(&id)
        .expect("record present before dispatch runs");
    let outcome = receiver.await.unwrap();
    let err = outcome.unwrap_err();
    assert_eq!(err.code, crate::error::ProtocolErrorCode::DispatchFailed);
    assert!(harness.registry().is_empty(), "registry back to empty");
}

// ---------------------------------------------------------------------------
// Scenario 6: TTL expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn silent_agent_times_out() {
    let mut config = AppConfig::default();
    config.delegation.ttl_ms = 30;
    config.delegation.reap_interval_ms = 10;
    let harness = setup_harness_with(config).await;
    tokio::fs::write(harness.root.path().join("prd.md"), "One feature.")
        .await
        .unwrap();

    let signal = harness
        .invoke("parse-requirements", json!({ "input": "prd.md" }))
        .await
        .unwrap();
    let id = interaction_id_of(&signal);

    let receiver = harness.registry().subscribe(&id).unwrap();
    let outcome = tokio::time::timeout(std::time::Duration::from_secs(2), receiver)
        .await
        .expect("reaper should fire")
        .unwrap();
    assert_eq!(
        outcome.unwrap_err().code,
        crate::error::ProtocolErrorCode::InteractionTimeout
    );
    assert!(harness.registry().is_empty());
}

// ---------------------------------------------------------------------------
// Agent-reported errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn agent_error_rejects_and_acks() {
    let harness = setup_harness().await;
    tokio::fs::write(harness.root.path().join("prd.md"), "One feature.")
        .await
        .unwrap();

    let signal = harness
        .invoke("parse-requirements", json!({ "input": "prd.md" }))
        .await
        .unwrap();
    let id = interaction_id_of(&signal);

    let receiver = harness.registry().subscribe(&id).unwrap();
    let ack = harness
        .agent_error(&id, json!({ "message": "model refused" }))
        .await;
    assert_eq!(ack["status"], "agent_response_processed_by_taskmaster");

    let outcome = receiver.await.unwrap();
    let err = outcome.unwrap_err();
    assert_eq!(err.code, crate::error::ProtocolErrorCode::AgentReported);
    assert!(err.message.contains("model refused"));
    assert!(harness.registry().is_empty());
    // No partial persistence on the error path.
    assert!(!harness.store().tasks_file().exists());
}

// ---------------------------------------------------------------------------
// Signal pass-through, both accepted shapes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wrapper_passes_plain_signal_through_unchanged() {
    let harness = setup_harness().await;
    let signal = json!({
        "needsAgentDelegation": true,
        "pendingInteraction": {
            "type": "agent_llm",
            "interactionId": "fixed-1",
            "delegatedCallDetails": {
                "originalCommand": "expand-task",
                "role": "main",
                "serviceType": "generate_text",
                "requestParameters": { "model": "m1", "messages": [] },
            },
        },
    });
    harness
        .runtime
        .channel
        .register(FixedResultTool::new("stub-delegating", signal.clone()));

    let result = harness.invoke("stub-delegating", json!({})).await.unwrap();
    assert_eq!(result, signal, "wrapper must not substitute the result");
    assert!(harness.registry().subscribe("fixed-1").is_some());
}

#[tokio::test]
async fn wrapper_reads_embedded_resource_signal() {
    let harness = setup_harness().await;
    let body = json!({
        "isAgentLLMPendingInteraction": true,
        "details": {
            "type": "agent_llm",
            "interactionId": "fixed-2",
            "delegatedCallDetails": {
                "originalCommand": "expand-task",
                "role": "main",
                "serviceType": "generate_text",
                "requestParameters": { "model": "m1", "messages": [] },
            },
        },
    });
    let signal = json!({
        "content": [{
            "type": "resource",
            "resource": {
                "uri": "agent-llm://pending-interaction",
                "text": body.to_string(),
            },
        }],
    });
    harness
        .runtime
        .channel
        .register(FixedResultTool::new("stub-resource", signal.clone()));

    let result = harness.invoke("stub-resource", json!({})).await.unwrap();
    assert_eq!(result, signal);
    assert!(harness.registry().subscribe("fixed-2").is_some());
}

// ---------------------------------------------------------------------------
// Research: save-to-file determinism and task attachment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn research_round_trip_writes_deterministic_doc() {
    let harness = setup_harness().await;
    seed(&harness, "master", vec![task(7, "Auth", TaskStatus::Pending)]).await;

    let args = json!({
        "query": "How does JWT auth work?",
        "taskIds": ["7"],
        "saveToFile": true,
        "saveTo": "7",
        "queryDate": "2025-01-15",
    });
    let expected_doc = harness
        .store()
        .research_dir()
        .join("2025-01-15_how-does-jwt-auth-work.md");

    for _ in 0..2 {
        let signal = harness.invoke("research", args.clone()).await.unwrap();
        let id = interaction_id_of(&signal);
        harness.agent_success(&id, json!("JWT uses signed tokens.")).await;
        let written = harness
            .eventually(|| async { expected_doc.exists() })
            .await;
        assert!(written);
    }

    let content = std::fs::read_to_string(&expected_doc).unwrap();
    assert!(content.contains("# Research: How does JWT auth work?"));
    assert!(content.contains("JWT uses signed tokens."));

    let store = harness.store();
    let attached = harness
        .eventually(|| async {
            store
                .read()
                .await
                .ok()
                .and_then(|doc| {
                    Some(
                        doc.tag("master")?
                            .task(7)?
                            .details
                            .as_deref()?
                            .contains("JWT uses signed tokens."),
                    )
                })
                .unwrap_or(false)
        })
        .await;
    assert!(attached);
}

// ---------------------------------------------------------------------------
// Tag-aware flow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_default_tag_flows_end_to_end() {
    let harness = setup_harness().await;
    seed(&harness, "feature-x", vec![task(5, "Five", TaskStatus::Pending)]).await;

    let signal = harness
        .invoke(
            "update-one-task",
            json!({ "id": 5, "append": true, "prompt": "note", "tag": "feature-x" }),
        )
        .await
        .unwrap();
    assert_eq!(
        signal["pendingInteraction"]["delegatedCallDetails"]["requestParameters"]["tagInfo"]["tag"],
        "feature-x"
    );
    let id = interaction_id_of(&signal);
    harness.agent_success(&id, json!("tagged note")).await;

    let store = harness.store();
    let updated = harness
        .eventually(|| async {
            store
                .read()
                .await
                .ok()
                .and_then(|doc| {
                    Some(
                        doc.tag("feature-x")?
                            .task(5)?
                            .details
                            .as_deref()?
                            .contains("tagged note"),
                    )
                })
                .unwrap_or(false)
        })
        .await;
    assert!(updated);
    assert!(store.tasks_dir().join("task_005_feature-x.txt").exists());
}

// ---------------------------------------------------------------------------
// Completion path: a non-delegating provider runs the same savers inline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scripted_completion_persists_synchronously() {
    let provider = ScriptedProvider::with_responses(vec![json!({
        "title": "Add auth",
        "description": "JWT based",
    })]);
    let harness = setup_harness_with_provider(provider).await;

    let result = harness
        .invoke("add-task", json!({ "prompt": "add auth", "priority": "high" }))
        .await
        .unwrap();
    assert_eq!(result["status"], "success");
    assert_eq!(result["result"]["taskId"], 1);

    // Synchronous path: no pending interaction, state already on disk.
    assert!(harness.registry().is_empty());
    let doc = harness.store().read().await.unwrap();
    let task = doc.tag("master").unwrap().task(1).unwrap().clone();
    assert_eq!(task.title, "Add auth");
    assert_eq!(task.priority, Some(crate::store::TaskPriority::High));
}

// ---------------------------------------------------------------------------
// Command-core guards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_task_update_is_refused_before_delegation() {
    let harness = setup_harness().await;
    seed(&harness, "master", vec![task(5, "Done", TaskStatus::Done)]).await;

    let err = harness
        .invoke("update-one-task", json!({ "id": 5, "prompt": "change it" }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("never updated"));
    assert!(harness.registry().is_empty());
}

#[tokio::test]
async fn parse_requirements_refuses_overwrite_without_force() {
    let harness = setup_harness().await;
    seed(&harness, "master", vec![task(1, "Existing", TaskStatus::Pending)]).await;
    tokio::fs::write(harness.root.path().join("prd.md"), "New plan.")
        .await
        .unwrap();

    let err = harness
        .invoke("parse-requirements", json!({ "input": "prd.md" }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("force"));
}

#[tokio::test]
async fn unknown_tool_lists_available_tools() {
    let harness = setup_harness().await;
    let err = harness.invoke("no-such-tool", json!({})).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Unknown tool"));
    assert!(message.contains("parse-requirements"));
    assert!(message.contains("delegate_llm_call"));
}

// ---------------------------------------------------------------------------
// Bulk update end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bulk_update_round_trip_reports_missing_ids() {
    let harness = setup_harness().await;
    seed(
        &harness,
        "master",
        vec![
            task(1, "One", TaskStatus::Done),
            task(2, "Two", TaskStatus::Pending),
            task(3, "Three", TaskStatus::Pending),
        ],
    )
    .await;

    let signal = harness
        .invoke(
            "update-many-tasks",
            json!({ "from": 2, "prompt": "switch to grpc" }),
        )
        .await
        .unwrap();
    let id = interaction_id_of(&signal);

    harness
        .agent_success(
            &id,
            json!([
                { "id": 2, "title": "Two (grpc)" },
                { "id": 3, "title": "Three (grpc)" },
                { "id": 9, "title": "Ghost" },
            ]),
        )
        .await;

    let store = harness.store();
    let applied = harness
        .eventually(|| async {
            store
                .read()
                .await
                .ok()
                .and_then(|doc| Some(doc.tag("master")?.task(2)?.title == "Two (grpc)"))
                .unwrap_or(false)
        })
        .await;
    assert!(applied);

    let doc = store.read().await.unwrap();
    let data = doc.tag("master").unwrap();
    assert_eq!(data.task(3).unwrap().title, "Three (grpc)");
    // Done task untouched, ghost id absent.
    assert_eq!(data.task(1).unwrap().title, "One");
    assert!(data.task(9).is_none());
}
