//! Sandbox abstraction layer for executron.
//!
//! Defines the [`SandboxProvider`] and [`Sandbox`] traits the gateway drives.
//! Isolation itself lives entirely behind these traits. Two providers exist:
//!
//! - [`e2b::E2bSandboxProvider`]: E2B-style cloud sandboxes over REST
//! - [`memory::MemorySandboxProvider`]: in-process recorder with scripted
//!   responses, used by tests
//!
//! [`create_provider`] picks the provider named in the config.

pub mod e2b;
pub mod memory;

use crate::config::{SandboxConfig, SandboxProviderKind};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Output from a command executed inside a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

/// A stateful, language-scoped execution session inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CodeContext {
    pub id: String,
    #[serde(default)]
    pub language: String,
}

/// One entry produced by running code in a context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResultEntry {
    /// Plain-text representation, when the entry has one.
    #[serde(default)]
    pub text: Option<String>,
    /// Whether this entry is the value of the last expression.
    #[serde(default, rename = "isMainResult", alias = "is_main_result")]
    pub is_main_result: bool,
}

impl ResultEntry {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            is_main_result: true,
        }
    }
}

/// In-band error raised by user code inside a context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExecutionError {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub traceback: String,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name.is_empty(), self.value.is_empty()) {
            (false, false) => write!(f, "{}: {}", self.name, self.value),
            (false, true) => f.write_str(&self.name),
            (true, _) => f.write_str(&self.value),
        }
    }
}

/// Output of [`Sandbox::run_code`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RunCodeOutput {
    #[serde(default)]
    pub results: Vec<ResultEntry>,
    #[serde(default)]
    pub error: Option<ExecutionError>,
}

/// A resolved, named sandbox instance.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Name the instance was resolved under.
    fn name(&self) -> &str;

    /// Write content to a file path inside the sandbox.
    async fn write_file(&self, path: &str, content: &str) -> anyhow::Result<()>;

    /// Run a shell command inside the sandbox, bounded by `timeout_ms`.
    async fn exec(&self, command: &str, timeout_ms: u64) -> anyhow::Result<CommandOutput>;

    /// Create an execution context scoped to `language`.
    async fn create_code_context(&self, language: &str) -> anyhow::Result<CodeContext>;

    /// Run `code` inside `context`, bounded by `timeout_ms`.
    async fn run_code(
        &self,
        context: &CodeContext,
        code: &str,
        timeout_ms: u64,
    ) -> anyhow::Result<RunCodeOutput>;

    /// Delete an execution context by identifier.
    async fn delete_code_context(&self, context_id: &str) -> anyhow::Result<()>;

    /// Tear down the whole instance.
    async fn destroy(&self) -> anyhow::Result<()>;
}

/// Resolves sandbox names to live instances.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Resolve the instance named `name`, creating it on first use.
    ///
    /// Idempotent by name: repeated and concurrent calls for one name yield
    /// the same underlying instance.
    async fn get_sandbox(&self, name: &str) -> anyhow::Result<Arc<dyn Sandbox>>;

    /// Provider name used in logs.
    fn name(&self) -> &str;
}

/// Build the provider selected by `config.provider`.
pub fn create_provider(config: &SandboxConfig) -> anyhow::Result<Arc<dyn SandboxProvider>> {
    match config.provider {
        SandboxProviderKind::E2b => {
            let provider = e2b::E2bSandboxProvider::new(config)?;
            tracing::info!(api_base = %config.api_base, "Using E2B sandbox provider");
            Ok(Arc::new(provider))
        }
    }
}
