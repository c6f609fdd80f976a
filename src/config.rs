use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub delegation: DelegationConfig,
    #[serde(default)]
    pub tags: TagsConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DelegationConfig {
    /// Reaper threshold for pending interactions. Long enough to cover the
    /// agent's slowest expected LLM call.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// How often the reaper scans for expired records.
    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,
}

fn default_ttl_ms() -> u64 {
    // 20 minutes
    1_200_000
}

fn default_reap_interval_ms() -> u64 {
    60_000
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            reap_interval_ms: default_reap_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TagsConfig {
    #[serde(default = "default_tag")]
    pub default: String,
}

fn default_tag() -> String {
    "master".to_string()
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            default: default_tag(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_main_model")]
    pub main: String,
    #[serde(default = "default_research_model")]
    pub research: String,
    #[serde(default = "default_main_model")]
    pub fallback: String,
}

fn default_main_model() -> String {
    "agent-delegated".to_string()
}

fn default_research_model() -> String {
    "agent-delegated-research".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            main: default_main_model(),
            research: default_research_model(),
            fallback: default_main_model(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Missing config file means defaults; a present-but-broken file is an
    /// error the operator should see.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
