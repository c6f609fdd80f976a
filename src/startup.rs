//! Assembly: wire the registry, savers, wrapper, channel, broker, command
//! cores, and the reaper into one runtime.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::broker::BrokerTool;
use crate::channel::ToolChannel;
use crate::commands::{self, CommandKit};
use crate::config::AppConfig;
use crate::interaction::{spawn_reaper, InteractionRegistry};
use crate::providers::RoleRouter;
use crate::savers::SaverRegistry;
use crate::traits::LlmProvider;
use crate::wrapper::ToolWrapper;

pub struct Runtime {
    pub channel: Arc<ToolChannel>,
    pub registry: Arc<InteractionRegistry>,
    pub reaper: JoinHandle<()>,
}

/// Standard wiring: every LLM role resolves to the delegating provider.
pub fn bootstrap(config: &AppConfig) -> Runtime {
    let router = RoleRouter::delegating(config.models.clone());
    bootstrap_with_router(config, router)
}

/// Wiring with a caller-supplied provider, used by tests (and by any future
/// deployment that mixes direct and delegated roles).
pub fn bootstrap_with_provider(config: &AppConfig, provider: Arc<dyn LlmProvider>) -> Runtime {
    let router = RoleRouter::new(config.models.clone(), provider);
    bootstrap_with_router(config, router)
}

fn bootstrap_with_router(config: &AppConfig, router: RoleRouter) -> Runtime {
    let registry = Arc::new(InteractionRegistry::new());
    let savers = Arc::new(SaverRegistry::standard());

    let wrapper = ToolWrapper::new(
        registry.clone(),
        savers.clone(),
        config.tags.default.clone(),
    );
    let channel = ToolChannel::new(wrapper);

    channel.register(Arc::new(BrokerTool::new()));
    let kit = CommandKit::new(router, savers, config.tags.default.clone());
    commands::install(&channel, &kit);

    let reaper = spawn_reaper(registry.clone(), &config.delegation);
    info!(
        tools = channel.tool_names().len(),
        ttl_ms = config.delegation.ttl_ms,
        default_tag = %config.tags.default,
        "Runtime assembled"
    );

    Runtime {
        channel,
        registry,
        reaper,
    }
}
