//! Configuration loading: TOML file, then environment overrides, then validation.

pub mod schema;

pub use schema::{
    Config, ExecutionConfig, GatewayConfig, PoolConfig, SandboxConfig, SandboxProviderKind,
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const REDACTED: &str = "***";

impl Config {
    /// `<config dir>/executron/config.toml` for the current platform.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "executron", "executron")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from `path`, or from [`Config::default_path`].
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    /// Process environment overrides are applied before validation.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(raw) => {
                let expanded = PathBuf::from(shellexpand::tilde(raw).as_ref());
                Self::from_file(&expanded)?
            }
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply `EXECUTRON_*` and `E2B_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = non_empty("EXECUTRON_HOST") {
            self.gateway.host = host;
        }
        if let Some(port) = non_empty("EXECUTRON_PORT").and_then(|v| v.parse().ok()) {
            self.gateway.port = port;
        }
        if let Some(size) = non_empty("EXECUTRON_POOL_SIZE").and_then(|v| v.parse().ok()) {
            self.pool.size = size;
        }
        if let Some(timeout) = non_empty("EXECUTRON_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.execution.timeout_ms = timeout;
        }
        if let Some(key) = non_empty("E2B_API_KEY") {
            self.sandbox.api_key = key;
        }
        if let Some(base) = non_empty("E2B_API_BASE") {
            self.sandbox.api_base = base;
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.pool.size > 0, "pool.size must be at least 1");
        anyhow::ensure!(
            !self.pool.prefix.is_empty()
                && self
                    .pool
                    .prefix
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "pool.prefix must be non-empty and contain only [A-Za-z0-9_-]"
        );
        anyhow::ensure!(
            self.execution.timeout_ms > 0,
            "execution.timeout_ms must be greater than 0"
        );
        anyhow::ensure!(
            !self.execution.script_runtime.trim().is_empty(),
            "execution.script_runtime must not be empty"
        );
        anyhow::ensure!(
            self.execution.script_dir.starts_with('/')
                && self
                    .execution
                    .script_dir
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "/._-".contains(c)),
            "execution.script_dir must be an absolute path of [A-Za-z0-9/._-]"
        );
        anyhow::ensure!(
            self.gateway.max_body_bytes > 0,
            "gateway.max_body_bytes must be greater than 0"
        );
        Ok(())
    }

    /// JSON Schema for the config file.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Config)).unwrap_or_default()
    }

    /// Effective config rendered as TOML with secrets masked.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if !shown.sandbox.api_key.is_empty() {
            shown.sandbox.api_key = REDACTED.to_string();
        }
        toml::to_string_pretty(&shown).context("Failed to render config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::SelectionStrategy;
    use crate::types::Language;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_pool_and_timeout() {
        let config = Config::default();
        assert_eq!(config.pool.prefix, "executron");
        assert_eq!(config.pool.size, 3);
        assert_eq!(config.pool.strategy, SelectionStrategy::Random);
        assert_eq!(config.execution.timeout_ms, 5_000);
        assert_eq!(config.execution.default_language, Language::TypeScript);
        config.validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[pool]
size = 5
strategy = "round_robin"

[execution]
default_language = "python"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.pool.size, 5);
        assert_eq!(config.pool.strategy, SelectionStrategy::RoundRobin);
        assert_eq!(config.pool.prefix, "executron");
        assert_eq!(config.execution.default_language, Language::Python);
        assert_eq!(config.execution.script_runtime, "bun");
        assert_eq!(config.gateway.port, 8787);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Config::load(Some(missing.to_str().unwrap())).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pool]\nstrategy = \"sticky\"\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("EXECUTRON_PORT", "9000"),
            ("EXECUTRON_POOL_SIZE", "7"),
            ("EXECUTRON_TIMEOUT_MS", "2500"),
            ("E2B_API_KEY", "secret"),
            ("EXECUTRON_HOST", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.pool.size, 7);
        assert_eq!(config.execution.timeout_ms, 2500);
        assert_eq!(config.sandbox.api_key, "secret");
        assert_eq!(config.gateway.host, "127.0.0.1");
    }

    #[test]
    fn unparsable_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "EXECUTRON_PORT").then(|| "http".to_string()));
        assert_eq!(config.gateway.port, 8787);
    }

    #[test]
    fn validate_rejects_empty_pool() {
        let mut config = Config::default();
        config.pool.size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.execution.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.execution.script_dir = "tmp".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_shell_unsafe_names() {
        for prefix in ["", "exec tron", "sb;rm -rf /", "$(id)", "a/b"] {
            let mut config = Config::default();
            config.pool.prefix = prefix.into();
            assert!(config.validate().is_err(), "prefix {prefix:?} accepted");
        }
        for dir in ["/tmp/my dir", "/tmp;reboot", "/tmp/$HOME"] {
            let mut config = Config::default();
            config.execution.script_dir = dir.into();
            assert!(config.validate().is_err(), "script_dir {dir:?} accepted");
        }

        let mut config = Config::default();
        config.pool.prefix = "runner_pool-2".into();
        config.execution.script_dir = "/var/run/exec.d".into();
        config.validate().unwrap();
    }

    #[test]
    fn redacted_toml_hides_api_key() {
        let mut config = Config::default();
        config.sandbox.api_key = "e2b_live_123".into();
        let rendered = config.to_redacted_toml().unwrap();
        assert!(!rendered.contains("e2b_live_123"));
        assert!(rendered.contains(REDACTED));

        let reparsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(reparsed.pool.size, 3);
    }

    #[test]
    fn schema_describes_sections() {
        let schema = Config::json_schema();
        let text = schema.to_string();
        assert!(text.contains("pool"));
        assert!(text.contains("round_robin"));
    }
}
