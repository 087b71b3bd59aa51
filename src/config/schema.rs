use crate::selector::SelectionStrategy;
use crate::types::Language;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Top-level executron configuration, loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub pool: PoolConfig,
    pub execution: ExecutionConfig,
    pub sandbox: SandboxConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Sandbox pool addressing.
///
/// `size` must match the number of instances the sandbox backend is
/// provisioned for.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PoolConfig {
    /// Instance names are `{prefix}-{index}`.
    pub prefix: String,
    pub size: u32,
    pub strategy: SelectionStrategy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            prefix: "executron".to_string(),
            size: 3,
            strategy: SelectionStrategy::Random,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Timeout for a single script run or context run, in milliseconds.
    pub timeout_ms: u64,
    /// Directory inside the sandbox that holds temporary scripts.
    pub script_dir: String,
    /// Command that runs a script file, e.g. `bun`.
    pub script_runtime: String,
    /// Language assumed when a request carries none.
    pub default_language: Language,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            script_dir: "/tmp".to_string(),
            script_runtime: "bun".to_string(),
            default_language: Language::TypeScript,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SandboxProviderKind {
    #[default]
    E2b,
}

/// Sandbox backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SandboxConfig {
    pub provider: SandboxProviderKind,
    pub api_base: String,
    /// Overridden by `E2B_API_KEY` when set.
    pub api_key: String,
    pub template: String,
    /// Lifetime requested for newly created sandboxes, in milliseconds.
    pub sandbox_timeout_ms: u64,
    /// Default timeout for control-plane HTTP calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            provider: SandboxProviderKind::E2b,
            api_base: "https://api.e2b.dev".to_string(),
            api_key: String::new(),
            template: "code-interpreter-v1".to_string(),
            sandbox_timeout_ms: 600_000,
            request_timeout_secs: 120,
        }
    }
}
