use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::traits::{DelegationToken, LlmOutcome, LlmProvider, LlmRequest};

/// Provider that never calls out. Every operation mints a fresh interaction
/// id and returns the would-be model inputs as a delegation token; the
/// driving agent performs the actual call and reports back through the
/// broker tool.
///
/// `stream_text` delegates identically to `generate_text`: the agent
/// protocol has no streaming form, so a delegated stream is one request and
/// one response.
pub struct DelegatingProvider;

impl DelegatingProvider {
    pub fn new() -> Self {
        Self
    }

    fn delegate(&self, request: LlmRequest) -> anyhow::Result<LlmOutcome> {
        let interaction_id = Uuid::new_v4().to_string();
        debug!(
            interaction_id = %interaction_id,
            model = %request.model,
            messages = request.messages.len(),
            "Delegating LLM call to agent"
        );
        Ok(LlmOutcome::Delegation(DelegationToken {
            interaction_id,
            details: request,
        }))
    }
}

impl Default for DelegatingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for DelegatingProvider {
    fn name(&self) -> &str {
        "agent-delegating"
    }

    async fn generate_text(&self, request: LlmRequest) -> anyhow::Result<LlmOutcome> {
        self.delegate(request)
    }

    async fn stream_text(&self, request: LlmRequest) -> anyhow::Result<LlmOutcome> {
        self.delegate(request)
    }

    async fn generate_object(&self, request: LlmRequest) -> anyhow::Result<LlmOutcome> {
        self.delegate(request)
    }

    /// No credentials exist on the host side; authorization is the agent's
    /// problem.
    async fn validate_auth(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
