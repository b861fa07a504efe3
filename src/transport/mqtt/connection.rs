//! Pure connection state management for MQTT client
//!
//! This module contains pure functions for connection state management,
//! broker settings and client options construction.

use crate::config::{ConfigError, MqttSection};
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// QoS used for every publish, the broker answers with PubAck
pub const PUBLISH_QOS: QoS = QoS::AtLeastOnce;

/// Connection state for MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - waiting for ConnAck
    Connecting,
    /// Successfully connected and ready for operations
    Connected,
    /// Disconnected with reason, never left again
    Disconnected(String),
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Disconnect failed")]
    DisconnectFailed(#[source] rumqttc::v5::ClientError),
}

/// Everything needed to open a broker session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrokerSettings {
    /// Resolve port defaults and the password file
    pub fn from_config(config: &MqttSection) -> Result<Self, ConfigError> {
        Ok(Self {
            host: config.host.clone(),
            port: config.effective_port(),
            tls: !config.disable_tls,
            username: config.username.clone(),
            password: config.resolve_password()?,
        })
    }

    pub fn tls_label(&self) -> &'static str {
        if self.tls {
            "enabled"
        } else {
            "disabled"
        }
    }
}

/// Unique client id per process so parallel bridges don't kick each other off
pub fn generate_client_id() -> String {
    format!("wireless-sensor-mqtt-{}", Uuid::new_v4().simple())
}

/// Pure function to configure MQTT options from broker settings
pub fn configure_mqtt_options(settings: &BrokerSettings) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(generate_client_id(), &settings.host, settings.port);

    // Platform trust store, broker hostname verified against the certificate
    if settings.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = &settings.username {
        let password = settings.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(60));
    mqtt_options
}
