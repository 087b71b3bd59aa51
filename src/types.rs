//! Request-level types shared by the gate, the selector and the dispatcher.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Languages accepted by the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    #[default]
    TypeScript,
}

/// How a language is executed inside a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    /// Wrapped into a temporary script and run by the script runtime.
    Script,
    /// Run inside a stateful, language-scoped execution context.
    Context,
}

impl ExecutionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPath::Script => "script",
            ExecutionPath::Context => "context",
        }
    }
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::JavaScript, Language::TypeScript];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }

    pub fn path(&self) -> ExecutionPath {
        match self {
            Language::JavaScript | Language::TypeScript => ExecutionPath::Script,
            Language::Python => ExecutionPath::Context,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a language tag is not one of [`Language::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.as_str() == s)
            .ok_or_else(|| UnsupportedLanguage(s.to_string()))
    }
}

/// A validated code execution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub code: String,
    pub user_id: Option<String>,
    pub language: Language,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: Language) -> Self {
        Self {
            code: code.into(),
            user_id: None,
            language,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_languages() {
        for lang in Language::ALL {
            assert_eq!(lang.as_str().parse::<Language>().unwrap(), lang);
        }
    }

    #[test]
    fn rejects_unknown_language() {
        let err = "ruby".parse::<Language>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported language: ruby");
    }

    #[test]
    fn language_tags_are_case_sensitive() {
        assert!("Python".parse::<Language>().is_err());
    }

    #[test]
    fn script_family_and_context_languages() {
        assert_eq!(Language::JavaScript.path(), ExecutionPath::Script);
        assert_eq!(Language::TypeScript.path(), ExecutionPath::Script);
        assert_eq!(Language::Python.path(), ExecutionPath::Context);
    }

    #[test]
    fn default_language_is_typescript() {
        assert_eq!(Language::default(), Language::TypeScript);
    }
}
