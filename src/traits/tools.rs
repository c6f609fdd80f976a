use async_trait::async_trait;
use serde_json::Value;

use crate::session::Session;

/// Per-invocation context supplied by the tool channel: the caller's session
/// (identity + project-root resolver). Logging goes through `tracing`
/// directly, so no logger handle travels here.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session: Session,
}

impl ToolContext {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

/// Tool trait — command cores, the broker, and anything else installed on
/// the tool channel.
///
/// Args and results are structured JSON rather than opaque strings: the
/// wrapper has to inspect every result for the delegation signal, and
/// callers consume structured envelopes.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn schema(&self) -> Value;

    async fn call(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value>;
}
