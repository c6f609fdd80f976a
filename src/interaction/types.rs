use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ProtocolError;
use crate::traits::ServiceType;

/// Sentinel URI of the embedded-resource form of the delegation signal.
pub const PENDING_INTERACTION_URI: &str = "agent-llm://pending-interaction";

/// Discriminator value inside a pending-interaction payload.
pub const PENDING_INTERACTION_TYPE: &str = "agent_llm";

/// Everything the agent needs to perform the delegated call, plus the
/// command-specific hints the saver needs on resumption. The hints live in
/// `request_parameters` next to the model inputs and are opaque to the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedCallDetails {
    pub original_command: String,
    pub role: String,
    pub service_type: ServiceType,
    pub request_parameters: Value,
}

/// Payload of the delegation signal a command core returns instead of a
/// completed result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingInteraction {
    #[serde(rename = "type")]
    pub kind: String,
    pub interaction_id: String,
    pub delegated_call_details: DelegatedCallDetails,
}

impl PendingInteraction {
    pub fn new(interaction_id: impl Into<String>, details: DelegatedCallDetails) -> Self {
        Self {
            kind: PENDING_INTERACTION_TYPE.to_string(),
            interaction_id: interaction_id.into(),
            delegated_call_details: details,
        }
    }
}

/// Canonical delegation signal shape. New code emits this one; the detector
/// below also reads the embedded-resource form found in older tools.
pub fn delegation_signal(pending: &PendingInteraction) -> Value {
    json!({
        "needsAgentDelegation": true,
        "pendingInteraction": pending,
    })
}

/// Detect a delegation signal in a tool result. Two equivalent shapes are
/// accepted:
///
/// 1. A plain object: `{ needsAgentDelegation: true, pendingInteraction }`.
/// 2. An embedded resource whose URI is [`PENDING_INTERACTION_URI`] and whose
///    text body parses to `{ isAgentLLMPendingInteraction: true, details }`,
///    either at the top level or inside a `content` array.
pub fn detect_delegation_signal(result: &Value) -> Option<PendingInteraction> {
    if result
        .get("needsAgentDelegation")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        if let Some(pending) = result.get("pendingInteraction") {
            return serde_json::from_value(pending.clone()).ok();
        }
    }

    if let Some(resource) = result.get("resource") {
        if let Some(pending) = pending_from_resource(resource) {
            return Some(pending);
        }
    }

    detect_in_content(result)
}

fn pending_from_resource(resource: &Value) -> Option<PendingInteraction> {
    if resource.get("uri")?.as_str()? != PENDING_INTERACTION_URI {
        return None;
    }
    let body: Value = serde_json::from_str(resource.get("text")?.as_str()?).ok()?;
    if !body
        .get("isAgentLLMPendingInteraction")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        return None;
    }
    serde_json::from_value(body.get("details")?.clone()).ok()
}

/// Scan a `content` array for the embedded-resource form; MCP-style tools
/// wrap results in content lists.
fn detect_in_content(result: &Value) -> Option<PendingInteraction> {
    for item in result.get("content")?.as_array()? {
        if item.get("type").and_then(|t| t.as_str()) == Some("resource") {
            if let Some(pending) = pending_from_resource(item.get("resource")?) {
                return Some(pending);
            }
        }
    }
    None
}

/// What the resolver delivers to whoever holds the original caller's
/// continuation. `main_result` is the agent's `finalLLMOutput` verbatim.
#[derive(Debug, Clone)]
pub struct DelegationResult {
    pub main_result: Value,
    pub telemetry_data: Value,
    pub tag_info: Value,
}

pub type InteractionOutcome = Result<DelegationResult, ProtocolError>;
