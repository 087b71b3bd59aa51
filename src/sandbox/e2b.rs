//! E2B sandbox provider: HTTP client for an E2B-style REST API.
//!
//! Sandboxes are addressed by pool name (`executron-1`, ...). The first
//! request for a name creates a sandbox tagged with that name; later requests
//! reuse the cached sandbox id.

use super::{CodeContext, CommandOutput, RunCodeOutput, Sandbox, SandboxProvider};
use crate::config::SandboxConfig;
use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Extra time granted to the HTTP call on top of the execution timeout, so
/// the remote side reports its own timeout before the client gives up.
const TIMEOUT_GRACE: Duration = Duration::from_secs(10);

/// Working directory for commands and contexts.
const WORKDIR: &str = "/home/user";

type InstanceCache = DashMap<String, Arc<OnceCell<String>>>;

/// Shared HTTP state for every sandbox handed out by one provider.
struct E2bApi {
    api_base: String,
    api_key: String,
    template: String,
    sandbox_timeout_ms: u64,
    http: reqwest::Client,
}

impl E2bApi {
    fn url(&self, path: &str) -> String {
        format!("{}/v0/sandboxes{path}", self.api_base.trim_end_matches('/'))
    }

    async fn create_sandbox(&self, name: &str) -> anyhow::Result<String> {
        anyhow::ensure!(!self.api_key.is_empty(), "E2B_API_KEY is not set");

        let body = serde_json::json!({
            "templateID": self.template,
            "timeout": self.sandbox_timeout_ms / 1000,
            "metadata": { "name": name },
        });

        let resp = self
            .http
            .post(self.url(""))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("E2B create sandbox request failed: {e}"))?;

        let body_text = success_body(resp).await?;
        let parsed: serde_json::Value = serde_json::from_str(&body_text)
            .map_err(|e| anyhow::anyhow!("Failed to parse E2B response: {e}\nBody: {body_text}"))?;

        let sandbox_id = parsed["sandboxID"]
            .as_str()
            .or_else(|| parsed["sandbox_id"].as_str())
            .unwrap_or("")
            .to_string();

        anyhow::ensure!(
            !sandbox_id.is_empty(),
            "E2B returned no sandbox_id. Response: {body_text}"
        );

        tracing::info!(sandbox = name, sandbox_id = %sandbox_id, "Created sandbox");
        Ok(sandbox_id)
    }
}

/// Read the response body, turning non-2xx statuses into errors.
async fn success_body(resp: reqwest::Response) -> anyhow::Result<String> {
    let status = resp.status();
    let body_text = resp
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable>".to_string());

    anyhow::ensure!(
        status.is_success(),
        "E2B API returned {status}: {body_text}"
    );

    Ok(body_text)
}

/// Provider that resolves pool names to E2B sandboxes.
pub struct E2bSandboxProvider {
    api: Arc<E2bApi>,
    instances: Arc<InstanceCache>,
}

impl E2bSandboxProvider {
    pub fn new(config: &SandboxConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build reqwest client")?;

        Ok(Self {
            api: Arc::new(E2bApi {
                api_base: config.api_base.clone(),
                api_key: config.api_key.clone(),
                template: config.template.clone(),
                sandbox_timeout_ms: config.sandbox_timeout_ms,
                http,
            }),
            instances: Arc::new(DashMap::new()),
        })
    }

    /// Sandbox id cached for `name`, if it was already created.
    pub fn cached_id(&self, name: &str) -> Option<String> {
        self.instances
            .get(name)
            .and_then(|cell| cell.get().cloned())
    }
}

#[async_trait]
impl SandboxProvider for E2bSandboxProvider {
    async fn get_sandbox(&self, name: &str) -> anyhow::Result<Arc<dyn Sandbox>> {
        // Clone the cell out so no map guard is held across the await.
        let cell = Arc::clone(&self.instances.entry(name.to_string()).or_default());

        let sandbox_id = cell
            .get_or_try_init(|| self.api.create_sandbox(name))
            .await
            .with_context(|| format!("failed to create sandbox {name}"))?
            .clone();

        Ok(Arc::new(E2bSandbox {
            name: name.to_string(),
            sandbox_id,
            api: Arc::clone(&self.api),
            instances: Arc::clone(&self.instances),
        }))
    }

    fn name(&self) -> &str {
        "e2b"
    }
}

/// Handle to one E2B sandbox.
pub struct E2bSandbox {
    name: String,
    sandbox_id: String,
    api: Arc<E2bApi>,
    instances: Arc<InstanceCache>,
}

impl E2bSandbox {
    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    fn url(&self, path: &str) -> String {
        self.api.url(&format!("/{}{path}", self.sandbox_id))
    }

    /// Drop this instance from the name cache, unless the name was already
    /// re-resolved to a newer sandbox.
    fn evict(&self) {
        self.instances.remove_if(&self.name, |_, cell| {
            cell.get().is_some_and(|id| *id == self.sandbox_id)
        });
    }

    /// [`success_body`] for calls addressed to this sandbox. A 404 means the
    /// sandbox expired or was killed; the next resolution creates a new one.
    async fn sandbox_body(&self, resp: reqwest::Response) -> anyhow::Result<String> {
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::warn!(
                sandbox = %self.name,
                sandbox_id = %self.sandbox_id,
                "Sandbox not found, evicting from cache"
            );
            self.evict();
        }
        success_body(resp).await
    }
}

#[async_trait]
impl Sandbox for E2bSandbox {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_file(&self, path: &str, content: &str) -> anyhow::Result<()> {
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .text("path", path.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(content.as_bytes().to_vec())
                    .file_name(file_name)
                    .mime_str("text/plain")
                    .map_err(|e| anyhow::anyhow!("MIME type error: {e}"))?,
            );

        let resp = self
            .api
            .http
            .post(self.url("/files"))
            .bearer_auth(&self.api.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("E2B write_file request failed: {e}"))?;

        self.sandbox_body(resp).await?;
        Ok(())
    }

    async fn exec(&self, command: &str, timeout_ms: u64) -> anyhow::Result<CommandOutput> {
        let body = serde_json::json!({
            "cmd": command,
            "workdir": WORKDIR,
            "timeoutMs": timeout_ms,
        });

        let resp = self
            .api
            .http
            .post(self.url("/commands"))
            .bearer_auth(&self.api.api_key)
            .timeout(Duration::from_millis(timeout_ms) + TIMEOUT_GRACE)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("E2B exec request failed: {e}"))?;

        let body_text = self.sandbox_body(resp).await?;
        let parsed: serde_json::Value = serde_json::from_str(&body_text)
            .map_err(|e| anyhow::anyhow!("Failed to parse E2B response: {e}\nBody: {body_text}"))?;

        Ok(CommandOutput {
            stdout: parsed["stdout"].as_str().unwrap_or("").to_string(),
            stderr: parsed["stderr"].as_str().unwrap_or("").to_string(),
            exit_code: parsed["exitCode"]
                .as_i64()
                .or_else(|| parsed["exit_code"].as_i64())
                .unwrap_or(0),
        })
    }

    async fn create_code_context(&self, language: &str) -> anyhow::Result<CodeContext> {
        let body = serde_json::json!({
            "language": language,
            "cwd": WORKDIR,
        });

        let resp = self
            .api
            .http
            .post(self.url("/contexts"))
            .bearer_auth(&self.api.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("E2B create context request failed: {e}"))?;

        let body_text = self.sandbox_body(resp).await?;
        let context: CodeContext = serde_json::from_str(&body_text)
            .map_err(|e| anyhow::anyhow!("Failed to parse E2B context: {e}\nBody: {body_text}"))?;

        anyhow::ensure!(
            !context.id.is_empty(),
            "E2B returned no context id. Response: {body_text}"
        );

        Ok(context)
    }

    async fn run_code(
        &self,
        context: &CodeContext,
        code: &str,
        timeout_ms: u64,
    ) -> anyhow::Result<RunCodeOutput> {
        let body = serde_json::json!({
            "code": code,
            "context_id": context.id,
            "timeoutMs": timeout_ms,
        });

        let resp = self
            .api
            .http
            .post(self.url("/execute"))
            .bearer_auth(&self.api.api_key)
            .timeout(Duration::from_millis(timeout_ms) + TIMEOUT_GRACE)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("E2B run_code request failed: {e}"))?;

        let body_text = self.sandbox_body(resp).await?;
        serde_json::from_str(&body_text)
            .map_err(|e| anyhow::anyhow!("Failed to parse E2B execution: {e}\nBody: {body_text}"))
    }

    async fn delete_code_context(&self, context_id: &str) -> anyhow::Result<()> {
        let url = self.url(&format!(
            "/contexts/{encoded}",
            encoded = urlencoding::encode(context_id)
        ));

        let resp = self
            .api
            .http
            .delete(&url)
            .bearer_auth(&self.api.api_key)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("E2B delete context request failed: {e}"))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        success_body(resp).await?;
        Ok(())
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        let resp = self
            .api
            .http
            .delete(self.url(""))
            .bearer_auth(&self.api.api_key)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("E2B kill request failed: {e}"))?;

        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            self.evict();
            tracing::info!(sandbox = %self.name, sandbox_id = %self.sandbox_id, "Sandbox destroyed");
            Ok(())
        } else {
            let body_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            anyhow::bail!("E2B API returned {status}: {body_text}")
        }
    }
}
