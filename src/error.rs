//! Crate-level error type for a bridge session
//!
//! Every fatal condition ends the session: configuration problems are reported
//! before the broker is contacted, connection and transport failures are never
//! retried, and the measurement sequence running dry is an error rather than a
//! normal shutdown. Publish timeouts and rejections are not errors; see
//! [`crate::publish::PublishOutcome`].

use crate::config::ConfigError;
use crate::sensor::SensorError;
use crate::transport::mqtt::MqttError;
use thiserror::Error;

/// Main error type for bridge sessions
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] MqttError),

    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("timeout waiting for packet")]
    MeasurementStreamTimeout,
}

impl BridgeError {
    /// Wrap an error raised by an arbitrary [`crate::transport::Transport`]
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(error))
    }

    /// Whether the error was raised before any network activity
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_timeout_message() {
        let error = BridgeError::MeasurementStreamTimeout;
        assert_eq!(error.to_string(), "timeout waiting for packet");
        assert!(!error.is_configuration_error());
    }

    #[test]
    fn test_config_error_conversion() {
        let error: BridgeError = ConfigError::MissingUsername.into();
        assert!(error.is_configuration_error());
        assert_eq!(
            error.to_string(),
            "Configuration error: Missing MQTT username"
        );
    }

    #[test]
    fn test_transport_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broker went away");
        let error = BridgeError::transport(io);

        assert!(matches!(error, BridgeError::Transport(_)));
        assert!(error.to_string().contains("broker went away"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_sensor_error_conversion() {
        let error: BridgeError = SensorError::ReceiverExited { status: Some(2) }.into();
        assert!(matches!(error, BridgeError::Sensor(_)));
        assert!(error.to_string().starts_with("Sensor error:"));
    }
}
