use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read resolver config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid resolver config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings shared by every resolver in a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    pub user_agent: String,
    /// Bearer token for the GitHub releases API. Only raises rate limits.
    pub github_token: Option<String>,
    pub github_api_url: String,
    /// Per-request cap for HTTP requests, including full downloads.
    pub request_timeout_secs: u64,
    /// Applied to `git ls-remote` when the run has no deadline of its own.
    pub git_timeout_secs: u64,
    pub git_program: String,
    pub registry_program: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            user_agent: crate::USER_AGENT.to_owned(),
            github_token: None,
            github_api_url: DEFAULT_GITHUB_API_URL.to_owned(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            git_timeout_secs: DEFAULT_GIT_TIMEOUT_SECS,
            git_program: "git".to_owned(),
            registry_program: "crane".to_owned(),
        }
    }
}

impl ResolverConfig {
    /// Defaults overlaid with `GITHUB_TOKEN` from the environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                self.github_token = Some(token);
            }
        }
        self
    }

    #[must_use]
    pub fn with_github_token(mut self, token: &str) -> Self {
        self.github_token = Some(token.to_owned());
        self
    }

    #[must_use]
    pub fn with_github_api_url(mut self, url: &str) -> Self {
        self.github_api_url = url.trim_end_matches('/').to_owned();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
        assert_eq!(config.git_timeout(), Duration::from_secs(30));
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert_eq!(config.git_program, "git");
        assert_eq!(config.registry_program, "crane");
        assert!(config.user_agent.starts_with("sourcepin/"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sourcepin.json");
        std::fs::write(&path, r#"{"git_timeout_secs": 5, "registry_program": "regctl"}"#)
            .unwrap();

        let config = ResolverConfig::load(&path).unwrap();
        assert_eq!(config.git_timeout_secs, 5);
        assert_eq!(config.registry_program, "regctl");
        assert_eq!(config.request_timeout_secs, 300);
    }

    #[test]
    fn unknown_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sourcepin.json");
        std::fs::write(&path, r#"{"gitt_timeout": 5}"#).unwrap();
        assert!(matches!(
            ResolverConfig::load(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn api_url_strips_trailing_slash() {
        let config = ResolverConfig::default()
            .with_github_api_url("http://127.0.0.1:9000/")
            .with_github_token("t0ken");
        assert_eq!(config.github_api_url, "http://127.0.0.1:9000");
        assert_eq!(config.github_token.as_deref(), Some("t0ken"));
    }
}
