//! Configuration system for the bridge
//!
//! Configuration can be loaded from a TOML file and is then overridden by
//! command line flags (see [`crate::cli`]). Validation runs once, before any
//! network activity.

use crate::homeassistant::{validate_node_id, NODE_ID_ALLOWED_CHARS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const MQTT_DEFAULT_PORT: u16 = 1883;
pub const MQTT_DEFAULT_TLS_PORT: u16 = 8883;

/// Main bridge configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub homeassistant: HomeAssistantSection,
    #[serde(default)]
    pub sensor: SensorSection,
}

/// MQTT broker connection and topic settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker hostname
    #[serde(default)]
    pub host: String,
    /// Broker port, defaults depend on `disable_tls`
    pub port: Option<u16>,
    #[serde(default)]
    pub disable_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    /// File holding the password, trailing newline stripped
    pub password_file: Option<PathBuf>,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

fn default_topic_prefix() -> String {
    "wireless-sensor/FT017TH".to_string()
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            disable_tls: false,
            username: None,
            password: None,
            password_file: None,
            topic_prefix: default_topic_prefix(),
        }
    }
}

impl MqttSection {
    /// Port to connect to: explicit port, else 8883 (1883 with TLS disabled)
    pub fn effective_port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.disable_tls => MQTT_DEFAULT_PORT,
            None => MQTT_DEFAULT_TLS_PORT,
        }
    }

    /// Password from `password` or the contents of `password_file`
    pub fn resolve_password(&self) -> Result<Option<String>, ConfigError> {
        match (&self.password, &self.password_file) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingPasswordSources),
            (Some(password), None) => Ok(Some(password.clone())),
            (None, Some(path)) => {
                let content = std::fs::read(path)?;
                let content = String::from_utf8(content).map_err(|_| {
                    ConfigError::InvalidConfig(format!(
                        "password file {} is not valid UTF-8",
                        path.display()
                    ))
                })?;
                Ok(Some(strip_trailing_newline(&content).to_string()))
            }
            (None, None) => Ok(None),
        }
    }
}

/// Strip exactly one trailing `\r\n` or `\n`
pub fn strip_trailing_newline(value: &str) -> &str {
    value
        .strip_suffix("\r\n")
        .or_else(|| value.strip_suffix('\n'))
        .unwrap_or(value)
}

/// Home Assistant discovery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HomeAssistantSection {
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
    /// Node identifier (must match [a-zA-Z0-9_-]+)
    #[serde(default = "default_node_id")]
    pub node_id: String,
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_node_id() -> String {
    "FT017TH".to_string()
}

impl Default for HomeAssistantSection {
    fn default() -> Self {
        Self {
            discovery_prefix: default_discovery_prefix(),
            node_id: default_node_id(),
        }
    }
}

/// Receiver wiring and measurement source selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorSection {
    /// Name of the GPIO line the transceiver's GDO0 pin is connected to
    pub gdo0_gpio_line_name: Option<String>,
    /// Release the SPI device lock after configuring the transceiver
    #[serde(default)]
    pub unlock_spi_device: bool,
    /// Verbose transceiver logging in the receiver
    #[serde(default)]
    pub debug_cc1101: bool,
    /// Publish random values instead of reading the receiver
    #[serde(default)]
    pub mock_measurements: bool,
    #[serde(default = "default_receiver_command")]
    pub receiver_command: String,
    #[serde(default = "default_receive_timeout_secs")]
    pub receive_timeout_secs: u64,
}

fn default_receiver_command() -> String {
    "wireless-sensor-receive".to_string()
}

fn default_receive_timeout_secs() -> u64 {
    3600 // 1 hour
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            gdo0_gpio_line_name: None,
            unlock_spi_device: false,
            debug_cc1101: false,
            mock_measurements: false,
            receiver_command: default_receiver_command(),
            receive_timeout_secs: default_receive_timeout_secs(),
        }
    }
}

impl SensorSection {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error(
        "invalid home assistant node id {0:?} (length >= 1, allowed characters: {NODE_ID_ALLOWED_CHARS})"
    )]
    InvalidNodeId(String),
    #[error("Missing MQTT username")]
    MissingUsername,
    #[error("MQTT password and password file are mutually exclusive")]
    ConflictingPasswordSources,
    #[error("Missing required setting: {0}")]
    MissingField(&'static str),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate identity and credential constraints
    ///
    /// Must succeed before the broker session is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.is_empty() {
            return Err(ConfigError::MissingField("mqtt.host"));
        }
        if !validate_node_id(&self.homeassistant.node_id) {
            return Err(ConfigError::InvalidNodeId(
                self.homeassistant.node_id.clone(),
            ));
        }
        if self.mqtt.password.is_some() && self.mqtt.password_file.is_some() {
            return Err(ConfigError::ConflictingPasswordSources);
        }
        let has_password = self.mqtt.password.is_some() || self.mqtt.password_file.is_some();
        if has_password && self.mqtt.username.is_none() {
            return Err(ConfigError::MissingUsername);
        }
        if !self.sensor.mock_measurements && self.sensor.gdo0_gpio_line_name.is_none() {
            return Err(ConfigError::MissingField("sensor.gdo0_gpio_line_name"));
        }
        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[mqtt]
host = "mqtt-broker.local"

[sensor]
gdo0_gpio_line_name = "GPIO24"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
