//! Script path: wrap code into a temporary module, run it, remove it.

use super::{spawn_cleanup, ExecutionOutcome};
use crate::observability::Metrics;
use crate::sandbox::Sandbox;
use anyhow::Context;
use scopeguard::ScopeGuard;
use std::sync::Arc;
use uuid::Uuid;

/// Timeout for the `rm` issued after each run.
const REMOVE_TIMEOUT_MS: u64 = 5_000;

/// A temporary script file holding wrapped user code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptUnit {
    pub path: String,
    pub content: String,
}

impl ScriptUnit {
    pub fn new(dir: &str, sandbox: &str, code: &str) -> Self {
        Self {
            path: unique_path(dir, sandbox, chrono::Utc::now().timestamp_millis()),
            content: wrap(code),
        }
    }
}

/// Path salted with the sandbox name, wall-clock millis and a random suffix,
/// so concurrent requests on one sandbox never share a file.
pub fn unique_path(dir: &str, sandbox: &str, millis: i64) -> String {
    format!(
        "{}/code-{sandbox}-{millis}-{}.mts",
        dir.trim_end_matches('/'),
        Uuid::new_v4().simple()
    )
}

/// Wrap a function body into a module that prints its resolved value.
///
/// `_` (lodash) and `fetch` are in scope for the user code.
pub fn wrap(code: &str) -> String {
    format!(
        "import _ from 'lodash';\n\
         const fetch = globalThis.fetch;\n\
         \n\
         console.log(await (async () => {{\n\
         {code}\n\
         }})());\n"
    )
}

/// Run `code` as a script; the unit is removed on every exit path.
///
/// If the returned future is dropped before removal completes, the removal
/// is finished on a background task.
pub async fn run(
    sandbox: &Arc<dyn Sandbox>,
    metrics: &Arc<Metrics>,
    script_dir: &str,
    runtime: &str,
    code: &str,
    timeout_ms: u64,
) -> anyhow::Result<ExecutionOutcome> {
    let unit = ScriptUnit::new(script_dir, sandbox.name(), code);
    let pending = scopeguard::guard(
        (Arc::clone(sandbox), Arc::clone(metrics), unit.clone()),
        |(sandbox, metrics, unit)| {
            spawn_cleanup("script", async move {
                remove(sandbox.as_ref(), &metrics, &unit).await;
            });
        },
    );

    let outcome = execute(sandbox.as_ref(), &unit, runtime, timeout_ms).await;
    remove(sandbox.as_ref(), metrics, &unit).await;
    ScopeGuard::into_inner(pending);
    outcome
}

async fn execute(
    sandbox: &dyn Sandbox,
    unit: &ScriptUnit,
    runtime: &str,
    timeout_ms: u64,
) -> anyhow::Result<ExecutionOutcome> {
    sandbox
        .write_file(&unit.path, &unit.content)
        .await
        .with_context(|| format!("failed to write script {}", unit.path))?;

    let output = sandbox
        .exec(&format!("{runtime} {}", unit.path), timeout_ms)
        .await
        .with_context(|| format!("failed to run script {}", unit.path))?;

    if output.exit_code != 0 {
        tracing::debug!(
            sandbox = sandbox.name(),
            exit_code = output.exit_code,
            "Script exited with non-zero status"
        );
    }

    Ok(ExecutionOutcome::from_streams(&output.stdout, &output.stderr))
}

async fn remove(sandbox: &dyn Sandbox, metrics: &Metrics, unit: &ScriptUnit) {
    let failure = match sandbox
        .exec(&format!("rm -f {}", unit.path), REMOVE_TIMEOUT_MS)
        .await
    {
        Ok(out) if out.exit_code == 0 => return,
        Ok(out) => format!("exit {}: {}", out.exit_code, out.stderr.trim()),
        Err(e) => format!("{e:#}"),
    };

    metrics.record_cleanup_failure("script");
    tracing::warn!(
        sandbox = sandbox.name(),
        path = %unit.path,
        "Failed to remove script: {failure}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::memory::{FailPoint, MemoryBehavior, MemorySandboxProvider, SandboxCall};
    use crate::sandbox::{CommandOutput, SandboxProvider};
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn wrapper_imports_lodash_and_prints_result() {
        let wrapped = wrap("return 5");
        assert!(wrapped.starts_with("import _ from 'lodash';"));
        assert!(wrapped.contains("const fetch = globalThis.fetch;"));
        assert!(wrapped.contains("console.log(await (async () => {\nreturn 5\n})());"));
    }

    #[test]
    fn paths_are_unique_within_one_millisecond() {
        let paths: HashSet<String> = (0..1_000)
            .map(|_| unique_path("/tmp", "executron-1", 1_700_000_000_000))
            .collect();
        assert_eq!(paths.len(), 1_000);
    }

    #[test]
    fn path_carries_sandbox_and_time() {
        let path = unique_path("/tmp/", "executron-2", 42);
        assert!(path.starts_with("/tmp/code-executron-2-42-"));
        assert!(path.ends_with(".mts"));
    }

    async fn run_with(behavior: MemoryBehavior) -> (anyhow::Result<ExecutionOutcome>, Vec<SandboxCall>) {
        let provider = MemorySandboxProvider::new(behavior);
        let metrics = Arc::new(Metrics::new().unwrap());
        let sandbox = provider.get_sandbox("executron-1").await.unwrap();
        let outcome = run(&sandbox, &metrics, "/tmp", "bun", "return 5", 5_000).await;
        (outcome, provider.calls())
    }

    fn written_path(calls: &[SandboxCall]) -> String {
        calls
            .iter()
            .find_map(|c| match c {
                SandboxCall::WriteFile { path, .. } => Some(path.clone()),
                _ => None,
            })
            .expect("script written")
    }

    fn commands(calls: &[SandboxCall]) -> Vec<String> {
        calls
            .iter()
            .filter_map(|c| match c {
                SandboxCall::Exec { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn captures_stdout_and_removes_unit() {
        let (outcome, calls) = run_with(MemoryBehavior {
            command_output: CommandOutput {
                stdout: "5\n".into(),
                ..Default::default()
            },
            ..Default::default()
        })
        .await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome.result.as_deref(), Some("5"));
        assert_eq!(outcome.error, None);

        let path = written_path(&calls);
        assert_eq!(
            commands(&calls),
            vec![format!("bun {path}"), format!("rm -f {path}")]
        );
    }

    #[tokio::test]
    async fn stdout_and_stderr_are_independent() {
        let (outcome, _) = run_with(MemoryBehavior {
            command_output: CommandOutput {
                stdout: "partial\n".into(),
                stderr: "TypeError: x is not a function\n".into(),
                exit_code: 1,
            },
            ..Default::default()
        })
        .await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome.result.as_deref(), Some("partial"));
        assert_eq!(
            outcome.error.as_deref(),
            Some("TypeError: x is not a function")
        );
    }

    #[tokio::test]
    async fn unit_is_removed_when_exec_fails() {
        let (outcome, calls) = run_with(MemoryBehavior {
            fail_on: Some(FailPoint::Exec),
            ..Default::default()
        })
        .await;

        assert!(outcome.is_err());
        let path = written_path(&calls);
        assert_eq!(commands(&calls).last(), Some(&format!("rm -f {path}")));
    }

    #[tokio::test]
    async fn removal_is_attempted_when_write_fails() {
        let (outcome, calls) = run_with(MemoryBehavior {
            fail_on: Some(FailPoint::WriteFile),
            ..Default::default()
        })
        .await;

        let err = outcome.unwrap_err();
        assert!(format!("{err:#}").contains("failed to write script"));
        let cmds = commands(&calls);
        assert_eq!(cmds.len(), 1);
        assert!(cmds[0].starts_with("rm -f /tmp/code-executron-1-"));
    }

    #[tokio::test]
    async fn removal_failure_does_not_fail_the_run() {
        let provider = MemorySandboxProvider::new(MemoryBehavior {
            command_output: CommandOutput {
                stdout: "ok\n".into(),
                ..Default::default()
            },
            fail_on: Some(FailPoint::Remove),
            ..Default::default()
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let sandbox = provider.get_sandbox("executron-1").await.unwrap();

        let outcome = run(&sandbox, &metrics, "/tmp", "bun", "return 'ok'", 5_000)
            .await
            .unwrap();
        assert_eq!(outcome.result.as_deref(), Some("ok"));
        assert_eq!(metrics.cleanup_failures("script"), 1);
    }

    #[tokio::test]
    async fn dropped_run_still_removes_unit() {
        let provider = MemorySandboxProvider::new(MemoryBehavior {
            stall_on: Some(FailPoint::Exec),
            ..Default::default()
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let sandbox = provider.get_sandbox("executron-1").await.unwrap();

        let stalled = run(&sandbox, &metrics, "/tmp", "bun", "while (true) {}", 5_000);
        assert!(tokio::time::timeout(Duration::from_millis(50), stalled)
            .await
            .is_err());

        for _ in 0..100 {
            if commands(&provider.calls()).len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let calls = provider.calls();
        let path = written_path(&calls);
        assert_eq!(
            commands(&calls),
            vec![format!("bun {path}"), format!("rm -f {path}")]
        );
    }
}
