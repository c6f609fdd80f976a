use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::info;

use crate::broker::BROKER_TOOL_NAME;
use crate::traits::{Tool, ToolContext};
use crate::wrapper::ToolWrapper;

/// The tool channel the host exposes: `register` installs a tool, `invoke`
/// executes one. Every invocation runs through the wrapper, which is where
/// the whole delegation protocol lives.
pub struct ToolChannel {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    wrapper: ToolWrapper,
}

impl ToolChannel {
    pub fn new(wrapper: ToolWrapper) -> Arc<Self> {
        Arc::new(Self {
            tools: RwLock::new(HashMap::new()),
            wrapper,
        })
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if name == BROKER_TOOL_NAME {
            self.wrapper.set_broker(tool.clone());
        }
        info!(tool = %name, "Registered tool");
        self.tools
            .write()
            .expect("tool table poisoned")
            .insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("tool table poisoned")
            .get(name)
            .cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .expect("tool table poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub async fn invoke(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> anyhow::Result<Value> {
        let Some(tool) = self.get(name) else {
            anyhow::bail!(
                "Unknown tool '{}'. Available tools: [{}]",
                name,
                self.tool_names().join(", ")
            );
        };
        self.wrapper.run(tool, args, ctx).await
    }
}
