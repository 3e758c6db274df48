//! Configuration for test environments
//!
//! Resolution order: built-in defaults, then `HA_URL` / `HA_TOKEN`, then
//! explicit [`EnvironmentOptions`] (from code or an options file).

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HassError, HassResult};

pub const DEFAULT_HASS_URL: &str = "http://localhost:8123";
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Environment variable holding the base URL
pub const HA_URL_VAR: &str = "HA_URL";
/// Environment variable holding the long-lived access token
pub const HA_TOKEN_VAR: &str = "HA_TOKEN";
/// Environment variable pointing at an options file
pub const HA_TEST_CONFIG_VAR: &str = "HA_TEST_CONFIG";

/// Environment options as a test runner would pass them
///
/// Every key is optional; keys are camelCase in files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvironmentOptions {
    pub hass_url: Option<String>,
    pub access_token: Option<String>,
    pub mock_fallback: Option<bool>,
    /// Milliseconds
    pub connection_timeout: Option<u64>,
}

impl EnvironmentOptions {
    /// Load options from a YAML or JSON file
    pub fn from_path(path: impl AsRef<Path>) -> HassResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| HassError::ReadOptions {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| HassError::ParseOptions {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved environment configuration
#[derive(Clone, PartialEq)]
pub struct EnvironmentConfig {
    pub hass_url: String,
    pub access_token: Option<String>,
    pub mock_fallback: bool,
    pub connection_timeout: Duration,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            hass_url: DEFAULT_HASS_URL.to_string(),
            access_token: None,
            mock_fallback: false,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }
}

impl EnvironmentConfig {
    /// Resolve from the process environment only
    pub fn from_env() -> Self {
        Self::resolve(|key| env::var(key).ok(), EnvironmentOptions::default())
    }

    /// Resolve from the process environment, overridden by `options`
    pub fn with_options(options: EnvironmentOptions) -> Self {
        Self::resolve(|key| env::var(key).ok(), options)
    }

    /// Resolve from the process environment and the file named by `HA_TEST_CONFIG`, if set
    pub fn load() -> HassResult<Self> {
        let options = match env::var(HA_TEST_CONFIG_VAR) {
            Ok(path) if !path.is_empty() => EnvironmentOptions::from_path(PathBuf::from(path))?,
            _ => EnvironmentOptions::default(),
        };
        Ok(Self::with_options(options))
    }

    /// Resolve using `lookup` for environment variables
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>, options: EnvironmentOptions) -> Self {
        let defaults = Self::default();
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());

        Self {
            hass_url: non_empty(options.hass_url)
                .or_else(|| non_empty(lookup(HA_URL_VAR)))
                .unwrap_or(defaults.hass_url),
            access_token: non_empty(options.access_token).or_else(|| non_empty(lookup(HA_TOKEN_VAR))),
            mock_fallback: options.mock_fallback.unwrap_or(defaults.mock_fallback),
            connection_timeout: options
                .connection_timeout
                .map(Duration::from_millis)
                .unwrap_or(defaults.connection_timeout),
        }
    }
}

impl std::fmt::Debug for EnvironmentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentConfig")
            .field("hass_url", &self.hass_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("mock_fallback", &self.mock_fallback)
            .field("connection_timeout", &self.connection_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EnvironmentConfig::resolve(vars(&[]), EnvironmentOptions::default());
        assert_eq!(config.hass_url, "http://localhost:8123");
        assert_eq!(config.access_token, None);
        assert!(!config.mock_fallback);
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_env_vars_fill_url_and_token() {
        let config = EnvironmentConfig::resolve(
            vars(&[("HA_URL", "http://hass.local:8123"), ("HA_TOKEN", "from-env")]),
            EnvironmentOptions::default(),
        );
        assert_eq!(config.hass_url, "http://hass.local:8123");
        assert_eq!(config.access_token.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_options_override_env_vars() {
        let options = EnvironmentOptions {
            hass_url: Some("http://override:8123".to_string()),
            access_token: Some("from-options".to_string()),
            mock_fallback: Some(true),
            connection_timeout: Some(500),
        };
        let config = EnvironmentConfig::resolve(
            vars(&[("HA_URL", "http://hass.local:8123"), ("HA_TOKEN", "from-env")]),
            options,
        );
        assert_eq!(config.hass_url, "http://override:8123");
        assert_eq!(config.access_token.as_deref(), Some("from-options"));
        assert!(config.mock_fallback);
        assert_eq!(config.connection_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_empty_token_counts_as_missing() {
        let config = EnvironmentConfig::resolve(vars(&[("HA_TOKEN", "")]), EnvironmentOptions::default());
        assert_eq!(config.access_token, None);
    }

    #[test]
    fn test_options_file_camel_case() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "hassUrl: http://yaml:8123\nmockFallback: true\nconnectionTimeout: 1500"
        )
        .unwrap();

        let options = EnvironmentOptions::from_path(file.path()).unwrap();
        assert_eq!(options.hass_url.as_deref(), Some("http://yaml:8123"));
        assert_eq!(options.mock_fallback, Some(true));
        assert_eq!(options.connection_timeout, Some(1500));
        assert_eq!(options.access_token, None);
    }

    #[test]
    fn test_options_file_accepts_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"accessToken": "tok", "mockFallback": false}}"#).unwrap();

        let options = EnvironmentOptions::from_path(file.path()).unwrap();
        assert_eq!(options.access_token.as_deref(), Some("tok"));
        assert_eq!(options.mock_fallback, Some(false));
    }

    #[test]
    fn test_options_file_errors() {
        let missing = EnvironmentOptions::from_path("/nonexistent/ha-test-options.yaml");
        assert!(matches!(missing, Err(HassError::ReadOptions { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hass_url: snake-case-is-rejected").unwrap();
        let bad = EnvironmentOptions::from_path(file.path());
        assert!(matches!(bad, Err(HassError::ParseOptions { .. })));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = EnvironmentConfig {
            access_token: Some("secret-token".to_string()),
            ..EnvironmentConfig::default()
        };
        assert!(!format!("{:?}", config).contains("secret-token"));
    }
}
