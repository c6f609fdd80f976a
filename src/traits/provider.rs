use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which provider operation a request (or a delegated request) targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    GenerateText,
    StreamText,
    GenerateObject,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::GenerateText => write!(f, "generate_text"),
            ServiceType::StreamText => write!(f, "stream_text"),
            ServiceType::GenerateObject => write!(f, "generate_object"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Full set of inputs for one LLM call. For a delegating provider these are
/// exactly the fields that travel to the agent inside the directive.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// JSON schema for `generate_object` requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
}

/// A completed (non-delegated) provider response. `content` is free text for
/// text services and a structured object for `generate_object`.
#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub content: Value,
}

/// Marker returned by a provider that does not call out: the LLM call has
/// been turned into a pending interaction the agent must fulfill.
#[derive(Debug, Clone)]
pub struct DelegationToken {
    pub interaction_id: String,
    pub details: LlmRequest,
}

/// Tagged result of any provider operation. Command cores match on the tag;
/// nothing downstream inspects the concrete provider type.
#[derive(Debug, Clone)]
pub enum LlmOutcome {
    Completion(LlmCompletion),
    Delegation(DelegationToken),
}

/// Polymorphic LLM provider. A role resolves to one of these; callers cannot
/// tell (and must not care) whether the implementation calls a real model or
/// hands the request to the driving agent.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_text(&self, request: LlmRequest) -> anyhow::Result<LlmOutcome>;

    async fn stream_text(&self, request: LlmRequest) -> anyhow::Result<LlmOutcome>;

    async fn generate_object(&self, request: LlmRequest) -> anyhow::Result<LlmOutcome>;

    /// Providers that need credentials verify them here.
    async fn validate_auth(&self) -> anyhow::Result<()>;

    async fn call(&self, service: ServiceType, request: LlmRequest) -> anyhow::Result<LlmOutcome> {
        match service {
            ServiceType::GenerateText => self.generate_text(request).await,
            ServiceType::StreamText => self.stream_text(request).await,
            ServiceType::GenerateObject => self.generate_object(request).await,
        }
    }
}
