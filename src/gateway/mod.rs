//! HTTP gateway: any `POST` runs code; `GET /health` and `GET /metrics` are reserved.
//!
//! Each request flows through validation ([`request`]), sandbox selection
//! ([`crate::selector`]), dispatch ([`crate::dispatch`]) and response shaping
//! ([`response`]). Handlers share no per-request mutable state.

pub mod request;
pub mod response;

use crate::config::Config;
use crate::dispatch::{Dispatcher, ExecutionOutcome};
use crate::observability::{Metrics, RequestOutcome};
use crate::sandbox::{self, SandboxProvider};
use crate::selector::{SandboxId, SandboxSelector};
use crate::types::{ExecutionRequest, Language};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use response::{ExecutionResponse, GatewayError};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn SandboxProvider>,
    pub selector: Arc<SandboxSelector>,
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<Metrics>,
    pub default_language: Language,
}

impl AppState {
    pub fn new(config: &Config, provider: Arc<dyn SandboxProvider>) -> Result<Self> {
        let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
        Ok(Self {
            provider,
            selector: Arc::new(SandboxSelector::from_config(&config.pool)),
            dispatcher: Arc::new(Dispatcher::new(&config.execution, Arc::clone(&metrics))),
            metrics,
            default_language: config.execution.default_language,
        })
    }
}

/// `GET /health` and `GET /metrics` are the only reserved routes; any other
/// method or path reaches [`handle_execute`].
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handle_health).fallback(handle_execute))
        .route("/metrics", get(handle_metrics).fallback(handle_execute))
        .fallback(handle_execute)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C / SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let provider = sandbox::create_provider(&config.sandbox)?;
    let state = AppState::new(&config, provider)?;
    let app = router(state, config.gateway.max_body_bytes);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(
        pool_size = config.pool.size,
        strategy = ?config.pool.strategy,
        "Gateway listening on http://{}",
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server error")?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// GET /health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /metrics in Prometheus text format.
async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Everything but the reserved GET routes: validate, select a sandbox, run, respond.
pub async fn handle_execute(
    State(state): State<AppState>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Result<ExecutionResponse, GatewayError> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) if method == Method::POST => {
            return Err(reject(&state, &method, rejection.into()));
        }
        Err(_) => Bytes::new(),
    };

    let request = match request::parse_request(&method, &body, state.default_language) {
        Ok(request) => request,
        Err(e) => return Err(reject(&state, &method, e.into())),
    };

    let sandbox_id = state.selector.select(&request);
    state.metrics.record_selection(&sandbox_id.name);

    tracing::info!("Executing code on {} for {}", request.language, sandbox_id);

    let language = request.language.as_str();
    match execute(&state, &sandbox_id, &request).await {
        Ok(outcome) => {
            state.metrics.record_request(language, RequestOutcome::Ok);
            Ok(outcome.into())
        }
        Err(e) => {
            tracing::error!(sandbox = %sandbox_id, language, "Execution failed: {e:#}");
            state.metrics.record_request(language, RequestOutcome::Failed);
            Err(GatewayError::Execution(e))
        }
    }
}

fn reject(state: &AppState, method: &Method, error: GatewayError) -> GatewayError {
    tracing::debug!(%method, "Rejected request: {error}");
    state.metrics.record_request("none", RequestOutcome::Rejected);
    error
}

async fn execute(
    state: &AppState,
    sandbox_id: &SandboxId,
    request: &ExecutionRequest,
) -> Result<ExecutionOutcome> {
    let sandbox = state
        .provider
        .get_sandbox(&sandbox_id.name)
        .await
        .with_context(|| format!("failed to resolve sandbox {sandbox_id}"))?;

    state.dispatcher.dispatch(&sandbox, request).await
}
