//! Response shapes for the execute endpoint.

use super::request::RequestError;
use crate::dispatch::ExecutionOutcome;
use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Completed execution. Both keys are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResponse {
    pub result: Option<String>,
    pub error: Option<String>,
}

impl From<ExecutionOutcome> for ExecutionResponse {
    fn from(outcome: ExecutionOutcome) -> Self {
        Self {
            result: outcome.result,
            error: outcome.error,
        }
    }
}

impl IntoResponse for ExecutionResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Error-only body for rejected or failed requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Request(#[from] RequestError),
    /// Body could not be read, e.g. over `gateway.max_body_bytes`.
    #[error(transparent)]
    Body(#[from] BytesRejection),
    /// Collaborator failure; rendered with its full context chain.
    #[error("{0:#}")]
    Execution(anyhow::Error),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Request(_) => StatusCode::BAD_REQUEST,
            GatewayError::Body(rejection) => rejection.status(),
            GatewayError::Execution(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_body_keeps_null_keys() {
        let body = serde_json::to_value(ExecutionResponse {
            result: None,
            error: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "result": null, "error": null }));
    }

    #[test]
    fn statuses() {
        assert_eq!(
            GatewayError::from(RequestError::MissingCode).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Execution(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn execution_error_carries_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("failed to resolve sandbox executron-1");
        assert_eq!(
            GatewayError::Execution(err).to_string(),
            "failed to resolve sandbox executron-1: connection refused"
        );
    }
}
