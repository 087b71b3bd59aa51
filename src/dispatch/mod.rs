//! Execution strategy dispatch.
//!
//! Script-family languages (`javascript`, `typescript`) go through
//! [`script`]; `python` goes through [`context`]. Exactly one path runs per
//! request, and each path releases what it created before returning.

pub mod context;
pub mod script;

use crate::config::ExecutionConfig;
use crate::observability::Metrics;
use crate::sandbox::{RunCodeOutput, Sandbox};
use crate::types::{ExecutionPath, ExecutionRequest};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Result text and error text extracted from either path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub result: Option<String>,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// Script path: stdout is the result, stderr the error.
    pub fn from_streams(stdout: &str, stderr: &str) -> Self {
        Self {
            result: normalize_stream(stdout),
            error: normalize_stream(stderr),
        }
    }

    /// Context path: first result entry's text, plus the in-band error.
    pub fn from_run(run: RunCodeOutput) -> Self {
        Self {
            result: run.results.into_iter().next().and_then(|entry| entry.text),
            error: run.error.map(|e| e.to_string()),
        }
    }
}

/// Drop the trailing newline a `console.log` adds; empty output is `None`.
fn normalize_stream(raw: &str) -> Option<String> {
    let trimmed = raw
        .strip_suffix('\n')
        .map(|s| s.strip_suffix('\r').unwrap_or(s))
        .unwrap_or(raw);
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Finish releasing `what` on a background task after the request future
/// was dropped mid-flight.
fn spawn_cleanup<F>(what: &'static str, cleanup: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            tracing::debug!("Request cancelled, releasing {what} in background");
            handle.spawn(cleanup);
        }
        Err(_) => tracing::warn!("Request cancelled outside a runtime, {what} not released"),
    }
}

pub struct Dispatcher {
    timeout_ms: u64,
    script_dir: String,
    script_runtime: String,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(config: &ExecutionConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            timeout_ms: config.timeout_ms,
            script_dir: config.script_dir.clone(),
            script_runtime: config.script_runtime.clone(),
            metrics,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Run `request` on `sandbox` along the path its language selects.
    pub async fn dispatch(
        &self,
        sandbox: &Arc<dyn Sandbox>,
        request: &ExecutionRequest,
    ) -> anyhow::Result<ExecutionOutcome> {
        let path = request.language.path();
        let started = Instant::now();

        let outcome = match path {
            ExecutionPath::Script => {
                script::run(
                    sandbox,
                    &self.metrics,
                    &self.script_dir,
                    &self.script_runtime,
                    &request.code,
                    self.timeout_ms,
                )
                .await
            }
            ExecutionPath::Context => {
                context::run(
                    sandbox,
                    &self.metrics,
                    request.language,
                    &request.code,
                    self.timeout_ms,
                )
                .await
            }
        };

        self.metrics
            .observe_execution(path.as_str(), started.elapsed());
        outcome
    }
}
