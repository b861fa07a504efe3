//! MQTT transport over `rumqttc` (MQTT v5)
//!
//! The module separates pure functions from I/O operations:
//!
//! - [`connection`] - Connection state, broker settings and client options
//! - [`message_handler`] - Pure routing of event-loop events
//! - [`delivery`] - Matching publish requests to broker acknowledgments
//! - [`client`] - Impure I/O operations and coordination
//!
//! # Usage
//!
//! ```rust,no_run
//! use wireless_sensor_mqtt::config::MqttSection;
//! use wireless_sensor_mqtt::transport::mqtt::{BrokerSettings, MqttClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let section = MqttSection {
//!     host: "mqtt-broker.local".to_string(),
//!     ..Default::default()
//! };
//! let mut client = MqttClient::new(BrokerSettings::from_config(&section)?);
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod delivery;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{BrokerSettings, ConnectionState, MqttError, PUBLISH_QOS};
pub use delivery::DeliveryTracker;
pub use message_handler::{EventRoute, MessageHandler};
