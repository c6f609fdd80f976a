//! Test infrastructure: scripted providers, signal-emitting stub tools, and
//! a fully wired channel against a temporary project root.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Mutex;

use crate::broker::BrokerTool;
use crate::channel::ToolChannel;
use crate::commands::{self, CommandKit};
use crate::config::AppConfig;
use crate::interaction::{spawn_reaper, InteractionRegistry};
use crate::providers::RoleRouter;
use crate::savers::SaverRegistry;
use crate::session::Session;
use crate::startup::{self, Runtime};
use crate::store::TaskStore;
use crate::traits::{
    LlmCompletion, LlmOutcome, LlmProvider, LlmRequest, Tool, ToolContext,
};
use crate::wrapper::ToolWrapper;

// ---------------------------------------------------------------------------
// ScriptedProvider
// ---------------------------------------------------------------------------

/// Provider that completes calls from a FIFO queue of scripted payloads,
/// for exercising the non-delegating completion path.
pub struct ScriptedProvider {
    responses: Mutex<Vec<Value>>,
}

impl ScriptedProvider {
    pub fn with_responses(responses: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
        })
    }

    async fn complete(&self) -> anyhow::Result<LlmOutcome> {
        let mut responses = self.responses.lock().await;
        let content = if responses.is_empty() {
            json!("scripted response")
        } else {
            responses.remove(0)
        };
        Ok(LlmOutcome::Completion(LlmCompletion { content }))
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_text(&self, _request: LlmRequest) -> anyhow::Result<LlmOutcome> {
        self.complete().await
    }

    async fn stream_text(&self, _request: LlmRequest) -> anyhow::Result<LlmOutcome> {
        self.complete().await
    }

    async fn generate_object(&self, _request: LlmRequest) -> anyhow::Result<LlmOutcome> {
        self.complete().await
    }

    async fn validate_auth(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FixedResultTool
// ---------------------------------------------------------------------------

/// Tool that returns a canned result, for driving the wrapper with exact
/// signal shapes.
pub struct FixedResultTool {
    name: &'static str,
    result: Value,
}

impl FixedResultTool {
    pub fn new(name: &'static str, result: Value) -> Arc<Self> {
        Arc::new(Self { name, result })
    }
}

#[async_trait]
impl Tool for FixedResultTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Returns a canned result"
    }

    fn schema(&self) -> Value {
        json!({ "name": self.name, "parameters": { "type": "object" } })
    }

    async fn call(&self, _args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        Ok(self.result.clone())
    }
}

// ---------------------------------------------------------------------------
// TestHarness
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub runtime: Runtime,
    pub root: TempDir,
    pub ctx: ToolContext,
}

pub async fn setup_harness() -> TestHarness {
    setup_harness_with(AppConfig::default()).await
}

pub async fn setup_harness_with(config: AppConfig) -> TestHarness {
    let root = TempDir::new().expect("temp project root");
    let runtime = startup::bootstrap(&config);
    let ctx = ToolContext::new(Session::with_project_root("test-session", root.path()));
    TestHarness { runtime, root, ctx }
}

pub async fn setup_harness_with_provider(provider: Arc<dyn LlmProvider>) -> TestHarness {
    let root = TempDir::new().expect("temp project root");
    let runtime = startup::bootstrap_with_provider(&AppConfig::default(), provider);
    let ctx = ToolContext::new(Session::with_project_root("test-session", root.path()));
    TestHarness { runtime, root, ctx }
}

/// A harness whose channel has no broker tool, for exercising dispatch
/// failure.
pub async fn setup_harness_without_broker() -> TestHarness {
    let config = AppConfig::default();
    let root = TempDir::new().expect("temp project root");

    let registry = Arc::new(InteractionRegistry::new());
    let savers = Arc::new(SaverRegistry::standard());
    let wrapper = ToolWrapper::new(registry.clone(), savers.clone(), config.tags.default.clone());
    let channel = ToolChannel::new(wrapper);
    let kit = CommandKit::new(
        RoleRouter::delegating(config.models.clone()),
        savers,
        config.tags.default.clone(),
    );
    commands::install(&channel, &kit);
    let reaper = spawn_reaper(registry.clone(), &config.delegation);

    let ctx = ToolContext::new(Session::with_project_root("test-session", root.path()));
    TestHarness {
        runtime: Runtime {
            channel,
            registry,
            reaper,
        },
        root,
        ctx,
    }
}

impl TestHarness {
    pub fn registry(&self) -> &Arc<InteractionRegistry> {
        &self.runtime.registry
    }

    pub fn store(&self) -> TaskStore {
        TaskStore::new(self.root.path())
    }

    /// Register the broker tool on a harness built without one.
    pub fn register_broker(&self) {
        self.runtime.channel.register(Arc::new(BrokerTool::new()));
    }

    pub async fn invoke(&self, tool: &str, args: Value) -> anyhow::Result<Value> {
        self.runtime.channel.invoke(tool, args, &self.ctx).await
    }

    /// The agent side of the protocol: report a successful LLM call.
    pub async fn agent_success(&self, interaction_id: &str, data: Value) -> Value {
        self.invoke(
            crate::broker::BROKER_TOOL_NAME,
            json!({
                "interactionId": interaction_id,
                "agentLLMResponse": { "status": "success", "data": data },
            }),
        )
        .await
        .expect("broker invocation")
    }

    /// The agent side of the protocol: report a failed LLM call.
    pub async fn agent_error(&self, interaction_id: &str, details: Value) -> Value {
        self.invoke(
            crate::broker::BROKER_TOOL_NAME,
            json!({
                "interactionId": interaction_id,
                "agentLLMResponse": { "status": "error", "errorDetails": details },
            }),
        )
        .await
        .expect("broker invocation")
    }

    /// Poll an async condition until it holds or two seconds elapse.
    /// Post-processing is fire-and-forget, so persisted state trails the ack.
    pub async fn eventually<F, Fut>(&self, mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

/// Pull the interaction id out of a delegation signal.
pub fn interaction_id_of(signal: &Value) -> String {
    signal["pendingInteraction"]["interactionId"]
        .as_str()
        .expect("delegation signal carries an interaction id")
        .to_string()
}
