//! wireless-sensor-mqtt - Rust Implementation
//!
//! MQTT client reporting measurements of FT017TH wireless thermo/hygrometers,
//! with Home Assistant MQTT discovery.
//!
//! # Overview
//!
//! This crate provides:
//! - A publish-confirmation gate bounding the wait for broker acknowledgments
//! - Home Assistant discovery documents, announced once per session
//! - The measurement relay loop and its session bootstrap
//! - An MQTT transport over `rumqttc` and a receiver process adapter
//!
//! # Quick Start
//!
//! ```rust
//! use wireless_sensor_mqtt::relay::{format_humidity, format_temperature, MeasurementTopics};
//!
//! let topics = MeasurementTopics::new("wireless-sensor/FT017TH");
//! assert_eq!(topics.temperature, "wireless-sensor/FT017TH/temperature-degrees-celsius");
//! assert_eq!(format_temperature(23.1234567), "23.12");
//! assert_eq!(format_humidity(0.501234567), "50.12");
//! ```

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod homeassistant;
pub mod observability;
pub mod publish;
pub mod relay;
pub mod sensor;
pub mod testing;
pub mod transport;

pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult};
pub use publish::{confirm_publish, confirm_publish_with, ConfirmationPolicy, PublishOutcome};
pub use relay::{RelaySession, SessionIdentity, SessionPhase};
pub use sensor::{Measurement, MeasurementSource};
pub use transport::mqtt::MqttClient;
pub use transport::Transport;
