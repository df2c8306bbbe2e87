//! YAML settings for a connection
//!
//! ```yaml
//! url: wss://stream.example.com/ws
//! buffer: true
//! preamble: { op: auth, key: secret }
//! drain_interval_ms: 1
//! backoff:
//!   initial_delay_ms: 100
//!   max_delay_ms: 10000
//!   randomisation_factor: 0.0
//! ```
//!
//! Only `url` is required. `UPSOCKET_URL` (from the environment or `.env`)
//! overrides it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use upsocket::{BackoffConfig, Connection, ConnectionBuilder, UpsocketError, WsMessage};

/// Environment variable holding the settings file path
pub const CONFIG_PATH_ENV: &str = "UPSOCKET_CONFIG_PATH";

/// Settings file used when [`CONFIG_PATH_ENV`] is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/upsocket.yaml";

/// Environment variable overriding the configured url
pub const URL_ENV: &str = "UPSOCKET_URL";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load settings file: {0}")]
    File(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to encode preamble: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid settings: {0}")]
    Validation(String),

    #[error("Failed to start connection: {0}")]
    Connection(#[from] UpsocketError),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Connection settings as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsocketSettings {
    /// `ws://` or `wss://` address
    pub url: String,

    /// Keep outbound messages while disconnected
    #[serde(default = "default_buffer")]
    pub buffer: bool,

    /// Sent first on every open; strings go out verbatim, anything else as JSON text
    #[serde(default)]
    pub preamble: Option<serde_json::Value>,

    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,

    #[serde(default)]
    pub backoff: BackoffSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffSettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default)]
    pub randomisation_factor: f64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            randomisation_factor: 0.0,
        }
    }
}

fn default_buffer() -> bool {
    true
}

fn default_drain_interval_ms() -> u64 {
    1
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

/// Settings file path from [`CONFIG_PATH_ENV`], or the default
pub fn config_path_from_env() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
        .into()
}

impl UpsocketSettings {
    /// Settings for `url` with every other field at its default
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            buffer: default_buffer(),
            preamble: None,
            drain_interval_ms: default_drain_interval_ms(),
            backoff: BackoffSettings::default(),
        }
    }

    /// Load settings from a YAML file and `.env`
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();
        debug!("Loading settings from {}", config_path.display());

        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut settings = Self::from_yaml(&yaml_content)?;

        // Don't fail if .env doesn't exist
        dotenv::dotenv().ok();
        settings.apply_overrides(|key| std::env::var(key).ok());

        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the file named by [`CONFIG_PATH_ENV`]
    pub fn load_from_env() -> Result<Self> {
        Self::load(config_path_from_env())
    }

    /// Parse YAML without environment overrides or validation
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply overrides looked up by environment variable name
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.url = url;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(SettingsError::Validation("url must not be empty".to_string()));
        }

        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(SettingsError::Validation(format!(
                "url must start with ws:// or wss://, got '{}'",
                self.url
            )));
        }

        if self.drain_interval_ms == 0 {
            return Err(SettingsError::Validation(
                "drain_interval_ms must be greater than 0".to_string(),
            ));
        }

        self.backoff_config()
            .validate()
            .map_err(|e| SettingsError::Validation(e.to_string()))
    }

    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.backoff.initial_delay_ms),
            max_delay: Duration::from_millis(self.backoff.max_delay_ms),
            randomisation_factor: self.backoff.randomisation_factor,
        }
    }

    /// The preamble as it goes on the wire
    pub fn preamble_message(&self) -> Result<Option<WsMessage>> {
        match &self.preamble {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(text)) => Ok(Some(WsMessage::Text(text.clone()))),
            Some(value) => Ok(Some(WsMessage::Text(serde_json::to_string(value)?))),
        }
    }

    /// A connection builder carrying these settings
    pub fn builder(&self) -> Result<ConnectionBuilder> {
        let mut builder = Connection::builder()
            .buffer(self.buffer)
            .drain_interval(Duration::from_millis(self.drain_interval_ms))
            .backoff(self.backoff_config());

        if let Some(preamble) = self.preamble_message()? {
            builder = builder.preamble(preamble);
        }
        Ok(builder)
    }

    /// Build a connection and start connecting to the configured url
    pub async fn connect(&self) -> Result<Connection> {
        let connection = self.builder()?.build().await?;
        connection.connect(self.url.as_str());
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_settings_use_defaults() {
        let settings = UpsocketSettings::from_yaml("url: ws://127.0.0.1:9001").unwrap();

        assert_eq!(settings, UpsocketSettings::new("ws://127.0.0.1:9001"));
        assert!(settings.buffer);
        assert_eq!(settings.drain_interval_ms, 1);
        assert_eq!(settings.backoff.initial_delay_ms, 100);
        assert_eq!(settings.backoff.max_delay_ms, 10_000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_full_settings() {
        let yaml = r#"
url: wss://stream.example.com/ws
buffer: false
preamble:
  op: auth
  key: secret
drain_interval_ms: 5
backoff:
  initial_delay_ms: 250
  max_delay_ms: 30000
  randomisation_factor: 0.5
"#;
        let settings = UpsocketSettings::from_yaml(yaml).unwrap();

        assert!(!settings.buffer);
        assert_eq!(settings.drain_interval_ms, 5);
        assert_eq!(
            settings.backoff_config(),
            BackoffConfig {
                initial_delay: Duration::from_millis(250),
                max_delay: Duration::from_secs(30),
                randomisation_factor: 0.5,
            }
        );
        assert_eq!(
            settings.preamble_message().unwrap(),
            Some(WsMessage::from(r#"{"op":"auth","key":"secret"}"#))
        );
    }

    #[test]
    fn test_string_preamble_is_sent_verbatim() {
        let settings =
            UpsocketSettings::from_yaml("url: ws://localhost\npreamble: hello there").unwrap();
        assert_eq!(
            settings.preamble_message().unwrap(),
            Some(WsMessage::from("hello there"))
        );
    }

    #[test]
    fn test_missing_url_is_a_yaml_error() {
        let err = UpsocketSettings::from_yaml("buffer: true").unwrap_err();
        assert!(matches!(err, SettingsError::Yaml(_)));
    }

    #[test]
    fn test_validation() {
        let mut settings = UpsocketSettings::new("http://example.com");
        assert!(matches!(settings.validate(), Err(SettingsError::Validation(_))));

        settings.url = "ws://example.com".to_string();
        settings.drain_interval_ms = 0;
        assert!(settings.validate().is_err());

        settings.drain_interval_ms = 1;
        settings.backoff.max_delay_ms = 10;
        assert!(settings.validate().is_err());

        settings.backoff.max_delay_ms = 10_000;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_url_override() {
        let mut settings = UpsocketSettings::new("ws://from-file");

        settings.apply_overrides(|_| Some("   ".to_string()));
        assert_eq!(settings.url, "ws://from-file");

        settings.apply_overrides(|key| (key == URL_ENV).then(|| "wss://from-env".to_string()));
        assert_eq!(settings.url, "wss://from-env");
    }

    #[tokio::test]
    async fn test_builder_from_settings() {
        let mut settings = UpsocketSettings::new("ws://127.0.0.1:1");
        settings.preamble = Some(serde_json::json!("auth"));

        let connection = settings.builder().unwrap().build().await.unwrap();
        assert_eq!(connection.state(), upsocket::ConnectionState::Idle);
    }
}
