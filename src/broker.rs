use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::interaction::DelegatedCallDetails;
use crate::traits::{Tool, ToolContext};

pub const BROKER_TOOL_NAME: &str = "delegate_llm_call";

/// Instruction block embedded in every directive so the agent knows how to
/// close the loop.
const AGENT_INSTRUCTIONS: &str = "Execute the LLM request in llmRequestForAgent using your own \
model access. Then call this tool again with the same interactionId and an agentLLMResponse of \
{status: \"success\", data: <the model output>} or {status: \"error\", errorDetails: {message}}.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentResponseStatus {
    Success,
    Error,
}

/// Completion envelope sent by the agent once its LLM call finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLlmResponse {
    pub status: AgentResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrokerArgs {
    #[serde(default)]
    interaction_id: Option<String>,
    #[serde(default)]
    delegated_call_details: Option<DelegatedCallDetails>,
    #[serde(default)]
    agent_llm_response: Option<AgentLlmResponse>,
    #[serde(default)]
    project_root: Option<String>,
}

/// The single bidirectional tool both sides of a delegation share.
///
/// Host→Agent invocations carry `delegatedCallDetails` and produce the
/// directive; Agent→Host invocations carry `agentLLMResponse` plus the
/// `interactionId` and produce the completion envelope the wrapper matches
/// against the registry. The broker itself never touches the registry —
/// correlation is the wrapper's job.
pub struct BrokerTool;

impl BrokerTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BrokerTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for BrokerTool {
    fn name(&self) -> &str {
        BROKER_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Bidirectional LLM delegation broker. The host emits pending LLM requests through it; \
         the agent returns completed LLM output through it."
    }

    fn schema(&self) -> Value {
        json!({
            "name": BROKER_TOOL_NAME,
            "description": self.description(),
            "parameters": {
                "type": "object",
                "properties": {
                    "interactionId": {
                        "type": "string",
                        "description": "Id correlating a directive with its completion. Required on the agent response form."
                    },
                    "delegatedCallDetails": {
                        "type": "object",
                        "description": "Host-to-agent form: the full delegated LLM request (originalCommand, role, serviceType, requestParameters)."
                    },
                    "agentLLMResponse": {
                        "type": "object",
                        "description": "Agent-to-host form: {status: success|error, data?, errorDetails?}."
                    },
                    "projectRoot": {
                        "type": "string",
                        "description": "Absolute path to the project root."
                    }
                }
            }
        })
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let args: BrokerArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => {
                return Ok(ProtocolError::invalid_broker_args(format!(
                    "Malformed broker arguments: {}",
                    e
                ))
                .to_envelope());
            }
        };

        if let Some(root) = &args.project_root {
            if !std::path::Path::new(root).is_absolute() {
                return Ok(ProtocolError::invalid_broker_args(format!(
                    "projectRoot must be an absolute path, got '{}'",
                    root
                ))
                .to_envelope());
            }
        }

        match (args.delegated_call_details, args.agent_llm_response) {
            (Some(_), Some(_)) => Ok(ProtocolError::ambiguous_broker_args().to_envelope()),
            (None, None) => Ok(ProtocolError::invalid_broker_args(
                "Provide delegatedCallDetails (host form) or agentLLMResponse (agent form)",
            )
            .to_envelope()),
            (Some(details), None) => Ok(directive_response(args.interaction_id, details)),
            (None, Some(response)) => {
                let Some(interaction_id) = args.interaction_id.filter(|id| !id.is_empty()) else {
                    return Ok(ProtocolError::missing_interaction_id().to_envelope());
                };
                Ok(completion_response(interaction_id, response))
            }
        }
    }
}

fn directive_response(interaction_id: Option<String>, details: DelegatedCallDetails) -> Value {
    let interaction_id =
        interaction_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    debug!(
        interaction_id = %interaction_id,
        command = %details.original_command,
        service = %details.service_type,
        "Emitting delegation directive"
    );
    json!({
        "toolResponseSource": "taskmaster_to_agent",
        "status": "pending_agent_llm_action",
        "message": format!(
            "LLM request for command '{}' is delegated to the agent.",
            details.original_command
        ),
        "llmRequestForAgent": details.request_parameters,
        "interactionId": interaction_id,
        "pendingInteractionSignalToAgent": {
            "type": "agent_must_respond_via_agent_llm",
            "interactionId": interaction_id,
            "instructions": AGENT_INSTRUCTIONS,
        },
    })
}

fn completion_response(interaction_id: String, response: AgentLlmResponse) -> Value {
    match response.status {
        AgentResponseStatus::Success => match response.data {
            Some(data) => json!({
                "toolResponseSource": "agent_to_taskmaster",
                "status": "llm_response_completed",
                "finalLLMOutput": data,
                "interactionId": interaction_id,
            }),
            // Success without a payload is treated as an error: there is
            // nothing to resume the command with.
            None => {
                warn!(interaction_id = %interaction_id, "Agent success response had no data");
                json!({
                    "toolResponseSource": "agent_to_taskmaster",
                    "status": "llm_response_error",
                    "error": { "message": "Agent reported success but sent no data" },
                    "interactionId": interaction_id,
                })
            }
        },
        AgentResponseStatus::Error => json!({
            "toolResponseSource": "agent_to_taskmaster",
            "status": "llm_response_error",
            "error": response
                .error_details
                .unwrap_or_else(|| json!({ "message": "Agent reported an error without details" })),
            "interactionId": interaction_id,
        }),
    }
}
