//! Context path: create a context, run the code in it, delete it.

use super::{spawn_cleanup, ExecutionOutcome};
use crate::observability::Metrics;
use crate::sandbox::{CodeContext, Sandbox};
use crate::types::Language;
use anyhow::Context;
use scopeguard::ScopeGuard;
use std::sync::Arc;

/// Run `code` in a fresh context; the context is deleted exactly once,
/// whether the run succeeds, reports an in-band error, or fails.
///
/// If the returned future is dropped before the delete completes, the
/// delete is finished on a background task.
pub async fn run(
    sandbox: &Arc<dyn Sandbox>,
    metrics: &Arc<Metrics>,
    language: Language,
    code: &str,
    timeout_ms: u64,
) -> anyhow::Result<ExecutionOutcome> {
    let context = sandbox
        .create_code_context(language.as_str())
        .await
        .with_context(|| format!("failed to create {language} execution context"))?;
    tracing::debug!(sandbox = sandbox.name(), context_id = %context.id, "Created execution context");

    let pending = scopeguard::guard(
        (Arc::clone(sandbox), Arc::clone(metrics), context.clone()),
        |(sandbox, metrics, context)| {
            spawn_cleanup("execution context", async move {
                release(sandbox.as_ref(), &metrics, &context).await;
            });
        },
    );

    let outcome = sandbox
        .run_code(&context, code, timeout_ms)
        .await
        .with_context(|| format!("failed to run code in context {}", context.id))
        .map(ExecutionOutcome::from_run);

    release(sandbox.as_ref(), metrics, &context).await;
    ScopeGuard::into_inner(pending);
    outcome
}

async fn release(sandbox: &dyn Sandbox, metrics: &Metrics, context: &CodeContext) {
    if let Err(e) = sandbox.delete_code_context(&context.id).await {
        metrics.record_cleanup_failure("context");
        tracing::warn!(
            sandbox = sandbox.name(),
            context_id = %context.id,
            "Failed to delete execution context: {e:#}"
        );
    }
}
