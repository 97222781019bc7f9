//! Executor configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::AuthScheme;
use crate::cache::CacheConfig;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;

fn default_get_timeout_ms() -> u64 {
    20_000
}

/// Everything needed to build a `RequestExecutor`.
///
/// Deserializable from JSON; every field except `base_url` has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutorConfig {
    pub base_url: String,
    /// Sent with every request; per-call headers override them.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Prepended to the library's own User-Agent identifier.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Drop a top-level `href` from JSON bodies before sending.
    #[serde(default)]
    pub strip_self_link: bool,
    #[serde(default)]
    pub auth: AuthScheme,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_get_timeout_ms")]
    pub get_timeout_ms: u64,
}

impl ExecutorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: BTreeMap::new(),
            user_agent: None,
            strip_self_link: false,
            auth: AuthScheme::default(),
            cache: CacheConfig::default(),
            retry: RetryPolicy::default(),
            get_timeout_ms: default_get_timeout_ms(),
        }
    }

    pub fn from_json_str(path: &Path, content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(path, &content)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::auth::ApiKey;
    use crate::cache::{CacheFiles, CacheMode};

    #[test]
    fn minimal_config_uses_defaults() {
        let config =
            ExecutorConfig::from_json_str(Path::new("inline"), r#"{"base_url": "https://api.example.com/v1"}"#)
                .unwrap();
        assert_eq!(config, ExecutorConfig::new("https://api.example.com/v1"));
        assert_eq!(config.get_timeout(), Duration::from_secs(20));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.cache.mode, CacheMode::Disabled);
    }

    #[test]
    fn full_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("executor.json");
        fs::write(
            &path,
            r#"{
                "base_url": "https://api.example.com/v1",
                "headers": {"X-Tenant": "acme"},
                "user_agent": "my-app/2.0",
                "strip_self_link": true,
                "auth": {"scheme": "basic", "id": "k", "secret": "s"},
                "cache": {"mode": "dev", "primary": "dev.json"},
                "retry": {"max_attempts": 3, "delay_ms": 100},
                "get_timeout_ms": 1000
            }"#,
        )
        .unwrap();

        let config = ExecutorConfig::from_json_file(&path).unwrap();
        assert_eq!(config.headers.get("X-Tenant").map(String::as_str), Some("acme"));
        assert_eq!(config.user_agent.as_deref(), Some("my-app/2.0"));
        assert!(config.strip_self_link);
        assert_eq!(config.auth, AuthScheme::Basic(ApiKey::new("k", "s")));
        assert_eq!(config.cache.mode, CacheMode::Dev(CacheFiles::new("dev.json")));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.get_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn missing_base_url_is_a_parse_error() {
        let err = ExecutorConfig::from_json_str(Path::new("inline"), "{}").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ExecutorConfig::from_json_file("/nonexistent/executor.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
