use std::fmt;

use serde_json::{json, Value};

/// Classified protocol error — tells the caller *why* an interaction failed
/// so it can pick the right recovery strategy. These never propagate past the
/// broker boundary; they are surfaced as structured envelopes instead.
#[derive(Debug, Clone)]
pub struct ProtocolError {
    pub code: ProtocolErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorCode {
    /// Broker invoked with neither a directive nor an agent response.
    InvalidBrokerArgs,
    /// Broker invoked with both forms at once.
    AmbiguousBrokerArgs,
    /// Agent response form without an interaction id.
    MissingInteractionId,
    /// Agent responded for an id with no pending record (already resolved,
    /// expired, or never issued).
    UnknownInteraction,
    /// Pending record outlived the configured TTL.
    InteractionTimeout,
    /// The directive could not be handed to the agent.
    DispatchFailed,
    /// The agent reported the LLM call itself failed.
    AgentReported,
}

impl ProtocolErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolErrorCode::InvalidBrokerArgs => "ERR_INVALID_BROKER_ARGS",
            ProtocolErrorCode::AmbiguousBrokerArgs => "ERR_AMBIGUOUS_BROKER_ARGS",
            ProtocolErrorCode::MissingInteractionId => "ERR_MISSING_INTERACTION_ID",
            ProtocolErrorCode::UnknownInteraction => "ERR_UNKNOWN_INTERACTION",
            ProtocolErrorCode::InteractionTimeout => "ERR_INTERACTION_TIMEOUT",
            ProtocolErrorCode::DispatchFailed => "ERR_DIRECTIVE_DISPATCH_FAILED",
            ProtocolErrorCode::AgentReported => "ERR_AGENT_LLM_FAILED",
        }
    }
}

impl ProtocolError {
    pub fn new(code: ProtocolErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_broker_args(message: impl Into<String>) -> Self {
        Self::new(ProtocolErrorCode::InvalidBrokerArgs, message)
    }

    pub fn ambiguous_broker_args() -> Self {
        Self::new(
            ProtocolErrorCode::AmbiguousBrokerArgs,
            "Provide either delegatedCallDetails or agentLLMResponse, not both",
        )
    }

    pub fn missing_interaction_id() -> Self {
        Self::new(
            ProtocolErrorCode::MissingInteractionId,
            "agentLLMResponse requires the interactionId of the pending interaction",
        )
    }

    pub fn unknown_interaction(id: &str) -> Self {
        Self::new(
            ProtocolErrorCode::UnknownInteraction,
            format!("No pending interaction with id '{}'", id),
        )
    }

    pub fn timeout(id: &str) -> Self {
        Self::new(
            ProtocolErrorCode::InteractionTimeout,
            format!("Interaction '{}' expired before the agent responded", id),
        )
    }

    pub fn dispatch_failed(message: impl Into<String>) -> Self {
        Self::new(ProtocolErrorCode::DispatchFailed, message)
    }

    pub fn agent_reported(details: &Value) -> Self {
        let message = details
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
            .unwrap_or_else(|| details.to_string());
        Self::new(ProtocolErrorCode::AgentReported, message)
    }

    /// Structured envelope returned over the tool channel in place of a
    /// normal result. Protocol errors are data, not `Err` propagation.
    pub fn to_envelope(&self) -> Value {
        json!({
            "status": "error",
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
            },
        })
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_code_and_message() {
        let err = ProtocolError::unknown_interaction("ghost");
        let envelope = err.to_envelope();
        assert_eq!(envelope["status"], "error");
        assert_eq!(envelope["error"]["code"], "ERR_UNKNOWN_INTERACTION");
        assert!(envelope["error"]["message"]
            .as_str()
            .unwrap()
            .contains("ghost"));
    }

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(
            ProtocolErrorCode::InteractionTimeout.as_str(),
            "ERR_INTERACTION_TIMEOUT"
        );
        assert_eq!(
            ProtocolErrorCode::AmbiguousBrokerArgs.as_str(),
            "ERR_AMBIGUOUS_BROKER_ARGS"
        );
    }
}
