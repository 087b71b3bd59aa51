//! In-process sandbox provider that records every call.
//!
//! Nothing is executed: commands and code runs answer with the outputs
//! configured in [`MemoryBehavior`]. Used to exercise the gateway without a
//! real sandbox backend.

use super::{CodeContext, CommandOutput, RunCodeOutput, Sandbox, SandboxProvider};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxCall {
    Resolve {
        sandbox: String,
    },
    WriteFile {
        sandbox: String,
        path: String,
        content: String,
    },
    Exec {
        sandbox: String,
        command: String,
        timeout_ms: u64,
    },
    CreateContext {
        sandbox: String,
        language: String,
        context_id: String,
    },
    RunCode {
        sandbox: String,
        context_id: String,
        code: String,
        timeout_ms: u64,
    },
    DeleteContext {
        sandbox: String,
        context_id: String,
    },
    Destroy {
        sandbox: String,
    },
}

/// Operation that can be made to fail or stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Resolve,
    WriteFile,
    /// Any command except file removal.
    Exec,
    /// `rm` commands issued to remove script files.
    Remove,
    CreateContext,
    RunCode,
    DeleteContext,
}

/// Scripted responses for a [`MemorySandboxProvider`].
#[derive(Debug, Clone, Default)]
pub struct MemoryBehavior {
    /// Returned by every non-`rm` command.
    pub command_output: CommandOutput,
    /// Returned by every `run_code`.
    pub run_output: RunCodeOutput,
    pub fail_on: Option<FailPoint>,
    /// Operation that never completes, for cancellation tests.
    pub stall_on: Option<FailPoint>,
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<SandboxCall>>,
    next_context: AtomicU64,
}

impl Shared {
    fn record(&self, call: SandboxCall) {
        self.calls.lock().push(call);
    }
}

/// Recording provider with scripted outputs.
#[derive(Clone, Default)]
pub struct MemorySandboxProvider {
    behavior: Arc<MemoryBehavior>,
    shared: Arc<Shared>,
}

impl MemorySandboxProvider {
    pub fn new(behavior: MemoryBehavior) -> Self {
        Self {
            behavior: Arc::new(behavior),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Snapshot of every call recorded so far, in order.
    pub fn calls(&self) -> Vec<SandboxCall> {
        self.shared.calls.lock().clone()
    }
}

fn injected(op: &str) -> anyhow::Error {
    anyhow::anyhow!("injected {op} failure")
}

#[async_trait]
impl SandboxProvider for MemorySandboxProvider {
    async fn get_sandbox(&self, name: &str) -> anyhow::Result<Arc<dyn Sandbox>> {
        self.shared.record(SandboxCall::Resolve {
            sandbox: name.to_string(),
        });
        if self.behavior.fail_on == Some(FailPoint::Resolve) {
            return Err(injected("resolve"));
        }
        Ok(Arc::new(MemorySandbox {
            name: name.to_string(),
            behavior: Arc::clone(&self.behavior),
            shared: Arc::clone(&self.shared),
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySandbox {
    name: String,
    behavior: Arc<MemoryBehavior>,
    shared: Arc<Shared>,
}

impl MemorySandbox {
    fn fails(&self, point: FailPoint) -> bool {
        self.behavior.fail_on == Some(point)
    }

    async fn stall(&self, point: FailPoint) {
        if self.behavior.stall_on == Some(point) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl Sandbox for MemorySandbox {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_file(&self, path: &str, content: &str) -> anyhow::Result<()> {
        self.shared.record(SandboxCall::WriteFile {
            sandbox: self.name.clone(),
            path: path.to_string(),
            content: content.to_string(),
        });
        self.stall(FailPoint::WriteFile).await;
        if self.fails(FailPoint::WriteFile) {
            return Err(injected("write"));
        }
        Ok(())
    }

    async fn exec(&self, command: &str, timeout_ms: u64) -> anyhow::Result<CommandOutput> {
        self.shared.record(SandboxCall::Exec {
            sandbox: self.name.clone(),
            command: command.to_string(),
            timeout_ms,
        });
        if command.starts_with("rm ") {
            self.stall(FailPoint::Remove).await;
            if self.fails(FailPoint::Remove) {
                return Err(injected("remove"));
            }
            return Ok(CommandOutput::default());
        }
        self.stall(FailPoint::Exec).await;
        if self.fails(FailPoint::Exec) {
            return Err(injected("exec"));
        }
        Ok(self.behavior.command_output.clone())
    }

    async fn create_code_context(&self, language: &str) -> anyhow::Result<CodeContext> {
        if self.fails(FailPoint::CreateContext) {
            return Err(injected("create context"));
        }
        let n = self.shared.next_context.fetch_add(1, Ordering::Relaxed) + 1;
        let context = CodeContext {
            id: format!("ctx-{n}"),
            language: language.to_string(),
        };
        self.shared.record(SandboxCall::CreateContext {
            sandbox: self.name.clone(),
            language: language.to_string(),
            context_id: context.id.clone(),
        });
        Ok(context)
    }

    async fn run_code(
        &self,
        context: &CodeContext,
        code: &str,
        timeout_ms: u64,
    ) -> anyhow::Result<RunCodeOutput> {
        self.shared.record(SandboxCall::RunCode {
            sandbox: self.name.clone(),
            context_id: context.id.clone(),
            code: code.to_string(),
            timeout_ms,
        });
        self.stall(FailPoint::RunCode).await;
        if self.fails(FailPoint::RunCode) {
            return Err(injected("run"));
        }
        Ok(self.behavior.run_output.clone())
    }

    async fn delete_code_context(&self, context_id: &str) -> anyhow::Result<()> {
        self.shared.record(SandboxCall::DeleteContext {
            sandbox: self.name.clone(),
            context_id: context_id.to_string(),
        });
        self.stall(FailPoint::DeleteContext).await;
        if self.fails(FailPoint::DeleteContext) {
            return Err(injected("delete context"));
        }
        Ok(())
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        self.shared.record(SandboxCall::Destroy {
            sandbox: self.name.clone(),
        });
        Ok(())
    }
}
