//! # Configuration
//!
//! Console configuration, resolved from defaults, an optional YAML or JSON
//! file, `RELAYDESK_*` environment variables and command-line overrides, in
//! that order.

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use url::Url;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
const DEFAULT_STREAM_PATH: &str = "events";
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
const DEFAULT_PAGE_SIZE: usize = 20;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported configuration format. Use 'yaml' or 'json'.")]
    UnsupportedFormat,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

/// Where the stream credential travels on connect.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPlacement {
    /// `Authorization: Bearer <token>` header.
    #[default]
    Header,
    /// `token=<token>` query parameter, for endpoints fronted by proxies that strip headers.
    Query,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Push-stream settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Path of the event stream below the API base URL.
    pub path: String,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay_secs: u64,
    pub credential_placement: CredentialPlacement,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_STREAM_PATH.to_string(),
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            credential_placement: CredentialPlacement::default(),
        }
    }
}

impl StreamSettings {
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HistorySettings {
    /// Messages requested per history page.
    pub page_size: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    /// Bearer token for the dashboard API and the push stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// The main configuration structure for the RelayDesk console
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the dashboard REST API
    pub api_base_url: Url,

    #[serde(default)]
    pub stream: StreamSettings,

    #[serde(default)]
    pub history: HistorySettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    /// File holding the persisted device identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id_path: Option<PathBuf>,
}

impl Config {
    /// Generates a default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            stream: StreamSettings::default(),
            history: HistorySettings::default(),
            logging: LoggingConfig::default(),
            auth: AuthConfig::default(),
            device_id_path: None,
        }
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to the configuration file.
    /// * `api_override` - Optional API base URL taking precedence over everything else.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, if an environment
    /// variable holds an invalid value, or if validation fails.
    pub fn load_config(
        config_path: Option<PathBuf>,
        api_override: Option<Url>,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => Self::with_defaults(),
        };

        let defaults = Self::with_defaults();

        // Environment only fills values the file left at their defaults
        if config.api_base_url == defaults.api_base_url
            && let Ok(url) = env::var("RELAYDESK_API_URL")
        {
            config.api_base_url = Url::parse(&url)
                .map_err(|err| ConfigError::invalid("RELAYDESK_API_URL", err.to_string()))?;
        }
        if config.logging.level == defaults.logging.level
            && let Ok(level) = env::var("RELAYDESK_LOG_LEVEL")
        {
            config.logging.level = level;
        }
        if config.logging.format == defaults.logging.format
            && let Ok(format) = env::var("RELAYDESK_LOG_FORMAT")
        {
            config.logging.format = match format.to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => {
                    return Err(ConfigError::invalid(
                        "RELAYDESK_LOG_FORMAT",
                        format!("expected 'text' or 'json', got '{other}'"),
                    ));
                }
            };
        }
        if config.auth.token.is_none()
            && let Ok(token) = env::var("RELAYDESK_TOKEN")
            && !token.trim().is_empty()
        {
            config.auth.token = Some(token);
        }
        if config.device_id_path.is_none()
            && let Ok(path) = env::var("RELAYDESK_DEVICE_FILE")
        {
            config.device_id_path = Some(PathBuf::from(path));
        }

        if let Some(url) = api_override {
            config.api_base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Ok(serde_yml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Err(ConfigError::UnsupportedFormat),
        }
    }

    /// Validates the resolved configuration.
    ///
    /// # Errors
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.api_base_url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "api_base_url",
                format!("unsupported scheme '{}'", self.api_base_url.scheme()),
            ));
        }
        if self.history.page_size == 0 {
            return Err(ConfigError::invalid(
                "history.page_size",
                "must be greater than 0",
            ));
        }
        if self.stream.reconnect_delay_secs == 0 {
            return Err(ConfigError::invalid(
                "stream.reconnect_delay_secs",
                "must be greater than 0",
            ));
        }
        if self.stream.path.trim().is_empty() {
            return Err(ConfigError::invalid("stream.path", "must not be empty"));
        }
        Ok(())
    }

    /// Resolves `path` below the API base URL.
    ///
    /// # Errors
    /// Returns an error if the joined URL is not valid.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        api_url(&self.api_base_url, path)
            .map_err(|err| ConfigError::invalid("api_base_url", err.to_string()))
    }

    /// Location of the persisted device identifier.
    #[must_use]
    pub fn resolved_device_id_path(&self) -> PathBuf {
        self.device_id_path.clone().unwrap_or_else(|| {
            BaseDirs::new().map_or_else(
                || PathBuf::from("./relaydesk.device"),
                |dirs| dirs.config_dir().join("relaydesk").join("device_id"),
            )
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn default_api_base_url() -> Url {
    Url::parse(DEFAULT_API_BASE_URL).unwrap_or_else(|_| unreachable!("static URL is valid"))
}

/// Appends `path` to `base` without dropping the base's last path segment.
///
/// # Errors
/// Returns an error if the combined string is not a valid URL.
pub fn api_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("RELAYDESK_API_URL");
            env::remove_var("RELAYDESK_LOG_LEVEL");
            env::remove_var("RELAYDESK_LOG_FORMAT");
            env::remove_var("RELAYDESK_TOKEN");
            env::remove_var("RELAYDESK_DEVICE_FILE");
        }
    }

    #[test]
    #[serial]
    fn test_config_with_defaults() {
        cleanup_env_vars();
        let config = Config::with_defaults();

        assert_eq!(config.api_base_url.as_str(), "http://localhost:3000/api");
        assert_eq!(config.stream.path, "events");
        assert_eq!(config.stream.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.stream.credential_placement, CredentialPlacement::Header);
        assert_eq!(config.history.page_size, 20);
        assert_eq!(config.logging.level, "info");
        assert!(config.auth.token.is_none());
    }

    #[test]
    #[serial]
    fn test_load_config_with_environment_variables() {
        cleanup_env_vars();
        unsafe {
            env::set_var("RELAYDESK_API_URL", "https://desk.example.com/api");
            env::set_var("RELAYDESK_LOG_LEVEL", "debug");
            env::set_var("RELAYDESK_LOG_FORMAT", "json");
            env::set_var("RELAYDESK_TOKEN", "secret");
        }

        let config = Config::load_config(None, None).unwrap();
        assert_eq!(config.api_base_url.as_str(), "https://desk.example.com/api");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.auth.token.as_deref(), Some("secret"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_api_override_precedence() {
        cleanup_env_vars();
        unsafe {
            env::set_var("RELAYDESK_API_URL", "https://env.example.com/api");
        }

        let override_url = Url::parse("https://cli.example.com/api").unwrap();
        let config = Config::load_config(None, Some(override_url.clone())).unwrap();
        assert_eq!(config.api_base_url, override_url);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_load_config_invalid_log_format_environment() {
        cleanup_env_vars();
        unsafe {
            env::set_var("RELAYDESK_LOG_FORMAT", "xml");
        }

        let err = Config::load_config(None, None).unwrap_err();
        assert!(err.to_string().contains("RELAYDESK_LOG_FORMAT"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_load_config_from_yaml_file() -> Result<(), Box<dyn std::error::Error>> {
        cleanup_env_vars();
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("relaydesk.yaml");
        fs::write(
            &path,
            "api_base_url: https://yaml.example.com/api\n\
             stream:\n  path: sse\n  reconnect_delay_secs: 2\n  credential_placement: query\n\
             history:\n  page_size: 50\n",
        )?;

        let config = Config::load_config(Some(path), None)?;
        assert_eq!(config.api_base_url.as_str(), "https://yaml.example.com/api");
        assert_eq!(config.stream.path, "sse");
        assert_eq!(config.stream.reconnect_delay_secs, 2);
        assert_eq!(config.stream.credential_placement, CredentialPlacement::Query);
        assert_eq!(config.history.page_size, 50);
        assert_eq!(config.logging, LoggingConfig::default());
        Ok(())
    }

    #[test]
    #[serial]
    fn test_load_config_from_json_file() -> Result<(), Box<dyn std::error::Error>> {
        cleanup_env_vars();
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("relaydesk.json");
        fs::write(
            &path,
            r#"{"api_base_url":"http://127.0.0.1:4000/api","auth":{"token":"t0"}}"#,
        )?;

        let config = Config::load_config(Some(path), None)?;
        assert_eq!(config.api_base_url.as_str(), "http://127.0.0.1:4000/api");
        assert_eq!(config.auth.token.as_deref(), Some("t0"));
        assert_eq!(config.history.page_size, 20);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_load_config_unsupported_format() {
        cleanup_env_vars();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("relaydesk.toml");
        fs::write(&path, "api_base_url = 'x'").unwrap();

        let err = Config::load_config(Some(path), None).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat));
    }

    #[test]
    #[serial]
    fn test_load_config_nonexistent_file() {
        cleanup_env_vars();
        let err = Config::load_config(Some(PathBuf::from("/nonexistent/relaydesk.yaml")), None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = Config::with_defaults();
        config.history.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_scheme() {
        let mut config = Config::with_defaults();
        config.api_base_url = Url::parse("ftp://example.com/api").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_keeps_api_prefix() {
        let config = Config::with_defaults();
        assert_eq!(
            config.endpoint("events").unwrap().as_str(),
            "http://localhost:3000/api/events"
        );
        assert_eq!(
            config.endpoint("/notifications").unwrap().as_str(),
            "http://localhost:3000/api/notifications"
        );
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = Config::with_defaults();
        let yaml = serde_yml::to_string(&config).unwrap();
        let parsed: Config = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
