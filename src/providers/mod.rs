//! Provider selection. Commands name a semantic role; the router resolves it
//! to a model id and a provider instance. Only the delegating provider ships
//! here — direct-call variants live outside this crate — but nothing in the
//! command layer depends on that.

mod delegating;

use std::fmt;
use std::sync::Arc;

pub use delegating::DelegatingProvider;

use crate::config::ModelsConfig;
use crate::traits::LlmProvider;

/// Semantic LLM role a command runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Main,
    Research,
    Fallback,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Main => write!(f, "main"),
            Role::Research => write!(f, "research"),
            Role::Fallback => write!(f, "fallback"),
        }
    }
}

/// Role-based provider and model selection.
#[derive(Clone)]
pub struct RoleRouter {
    models: ModelsConfig,
    provider: Arc<dyn LlmProvider>,
}

impl RoleRouter {
    pub fn new(models: ModelsConfig, provider: Arc<dyn LlmProvider>) -> Self {
        Self { models, provider }
    }

    /// Router over the delegating provider — the standard wiring for a host
    /// that never calls models itself.
    pub fn delegating(models: ModelsConfig) -> Self {
        Self::new(models, Arc::new(DelegatingProvider::new()))
    }

    pub fn model_for(&self, role: Role) -> &str {
        match role {
            Role::Main => &self.models.main,
            Role::Research => &self.models.research,
            Role::Fallback => &self.models.fallback,
        }
    }

    pub fn provider(&self, _role: Role) -> Arc<dyn LlmProvider> {
        self.provider.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_map_to_configured_models() {
        let router = RoleRouter::delegating(ModelsConfig {
            main: "m-main".to_string(),
            research: "m-research".to_string(),
            fallback: "m-fallback".to_string(),
        });
        assert_eq!(router.model_for(Role::Main), "m-main");
        assert_eq!(router.model_for(Role::Research), "m-research");
        assert_eq!(router.model_for(Role::Fallback), "m-fallback");
    }
}
