//! Request validation. Nothing here touches a sandbox.

use crate::types::{ExecutionRequest, Language, UnsupportedLanguage};
use axum::http::Method;
use serde::Deserialize;

/// Client-caused rejection, reported as `400`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("should be post request")]
    MethodNotAllowed,
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("No code provided")]
    MissingCode,
    #[error(transparent)]
    UnsupportedLanguage(#[from] UnsupportedLanguage),
}

/// Body as sent by callers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    code: Option<String>,
    user_id: Option<String>,
    language: Option<String>,
}

/// Validate method and body, producing a normalized request.
///
/// Checks run in order: method, body shape, code, language. An empty
/// `language` counts as absent and resolves to `default_language`.
pub fn parse_request(
    method: &Method,
    body: &[u8],
    default_language: Language,
) -> Result<ExecutionRequest, RequestError> {
    if *method != Method::POST {
        return Err(RequestError::MethodNotAllowed);
    }

    let raw: RawRequest =
        serde_json::from_slice(body).map_err(|e| RequestError::InvalidBody(e.to_string()))?;

    let code = match raw.code {
        Some(code) if !code.is_empty() => code,
        _ => return Err(RequestError::MissingCode),
    };

    let language = match raw.language.as_deref() {
        None | Some("") => default_language,
        Some(tag) => tag.parse::<Language>()?,
    };

    Ok(ExecutionRequest {
        code,
        user_id: raw.user_id,
        language,
    })
}
