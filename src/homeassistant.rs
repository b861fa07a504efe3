//! Home Assistant MQTT discovery
//!
//! Publishes one retained config document per measured quantity so Home
//! Assistant creates the sensor entities without manual setup.
//!
//! Reference: <https://www.home-assistant.io/integrations/mqtt/#mqtt-discovery>

use crate::publish::{confirm_publish_with, ConfirmationPolicy, PublishOutcome};
use crate::transport::Transport;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Characters allowed in a discovery node id
pub const NODE_ID_ALLOWED_CHARS: &str = "a-zA-Z0-9_-";

pub const DEVICE_MODEL: &str = "FT017TH";

/// Seconds without a fresh value before Home Assistant marks the entity unavailable
pub const EXPIRE_AFTER_SECONDS: u32 = 60 * 10;

const UNIQUE_ID_PREFIX: &str = "fphammerle/wireless-sensor-mqtt";

static NODE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^[{NODE_ID_ALLOWED_CHARS}]+$")).unwrap());

/// Check a node id against `[a-zA-Z0-9_-]+`
pub fn validate_node_id(node_id: &str) -> bool {
    NODE_ID_PATTERN.is_match(node_id)
}

/// Measured quantities announced to Home Assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementKind {
    Temperature,
    RelativeHumidity,
}

impl MeasurementKind {
    /// Object id, also the last segment of the state topic
    pub fn object_id(self) -> &'static str {
        match self {
            Self::Temperature => "temperature-degrees-celsius",
            Self::RelativeHumidity => "relative-humidity-percent",
        }
    }

    /// <https://www.home-assistant.io/integrations/sensor/#device-class>
    pub fn device_class(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::RelativeHumidity => "humidity",
        }
    }

    pub fn unit_of_measurement(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::RelativeHumidity => "%",
        }
    }

    fn name_suffix(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::RelativeHumidity => "relative humidity",
        }
    }
}

/// Device block shared by both entities
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeviceAttributes {
    /// Home Assistant requires at least one identifier per device
    pub identifiers: Vec<String>,
    pub model: String,
}

/// Sensor discovery document
///
/// <https://www.home-assistant.io/integrations/sensor.mqtt/#configuration-variables>
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiscoveryConfig {
    pub unique_id: String,
    pub device_class: String,
    /// Friendly name, also the template for the default entity id
    pub name: String,
    pub state_topic: String,
    pub unit_of_measurement: String,
    pub expire_after: u32,
    pub device: DeviceAttributes,
}

impl DiscoveryConfig {
    pub fn new(node_id: &str, kind: MeasurementKind, state_topic: &str) -> Self {
        Self {
            unique_id: format!(
                "{UNIQUE_ID_PREFIX}/{DEVICE_MODEL}/{node_id}/{}",
                kind.object_id()
            ),
            device_class: kind.device_class().to_string(),
            name: format!("{node_id} {}", kind.name_suffix()),
            state_topic: state_topic.to_string(),
            unit_of_measurement: kind.unit_of_measurement().to_string(),
            expire_after: EXPIRE_AFTER_SECONDS,
            device: DeviceAttributes {
                identifiers: vec![format!("{DEVICE_MODEL}/{node_id}")],
                model: DEVICE_MODEL.to_string(),
            },
        }
    }

    pub fn to_payload(&self) -> String {
        // only strings and integers, serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Discovery topic: `{discovery_prefix}/sensor/{node_id}/{object_id}/config`
pub fn discovery_topic(discovery_prefix: &str, node_id: &str, kind: MeasurementKind) -> String {
    format!(
        "{discovery_prefix}/sensor/{node_id}/{}/config",
        kind.object_id()
    )
}

/// Publish the retained temperature and humidity discovery documents
///
/// Temperature is always announced first. Publish failures are logged by the
/// confirmation gate and do not abort the announcement.
pub async fn publish_discovery_config<T: Transport + ?Sized>(
    transport: &T,
    discovery_prefix: &str,
    node_id: &str,
    temperature_topic: &str,
    humidity_topic: &str,
) -> [PublishOutcome; 2] {
    publish_discovery_config_with(
        transport,
        discovery_prefix,
        node_id,
        temperature_topic,
        humidity_topic,
        &ConfirmationPolicy::default(),
    )
    .await
}

pub async fn publish_discovery_config_with<T: Transport + ?Sized>(
    transport: &T,
    discovery_prefix: &str,
    node_id: &str,
    temperature_topic: &str,
    humidity_topic: &str,
    policy: &ConfirmationPolicy,
) -> [PublishOutcome; 2] {
    let temperature = announce(
        transport,
        discovery_prefix,
        node_id,
        MeasurementKind::Temperature,
        temperature_topic,
        policy,
    )
    .await;
    let humidity = announce(
        transport,
        discovery_prefix,
        node_id,
        MeasurementKind::RelativeHumidity,
        humidity_topic,
        policy,
    )
    .await;
    [temperature, humidity]
}

async fn announce<T: Transport + ?Sized>(
    transport: &T,
    discovery_prefix: &str,
    node_id: &str,
    kind: MeasurementKind,
    state_topic: &str,
    policy: &ConfirmationPolicy,
) -> PublishOutcome {
    let topic = discovery_topic(discovery_prefix, node_id, kind);
    let payload = DiscoveryConfig::new(node_id, kind, state_topic).to_payload();
    confirm_publish_with(transport, &topic, &payload, true, policy).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_node_id() {
        let cases = vec![
            ("FT017TH", true),
            ("ft017th-living-room", true),
            ("bed_room_sensor", true),
            ("a", true),
            ("", false),
            ("no pe", false),
            ("living.room", false),
            ("sensor/1", false),
            ("ümlaut", false),
            ("line\nbreak", false),
        ];

        for (node_id, expected) in cases {
            assert_eq!(validate_node_id(node_id), expected, "node id: {node_id:?}");
        }
    }

    #[test]
    fn test_discovery_topic() {
        assert_eq!(
            discovery_topic("homeassistant", "ft017th-living-room", MeasurementKind::Temperature),
            "homeassistant/sensor/ft017th-living-room/temperature-degrees-celsius/config"
        );
        assert_eq!(
            discovery_topic("home/assistant", "n", MeasurementKind::RelativeHumidity),
            "home/assistant/sensor/n/relative-humidity-percent/config"
        );
    }

    #[test]
    fn test_temperature_document() {
        let config = DiscoveryConfig::new(
            "bed-room-sensor",
            MeasurementKind::Temperature,
            "living-room/ft017th/temp",
        );
        let value: serde_json::Value = serde_json::from_str(&config.to_payload()).unwrap();

        assert_eq!(
            value,
            json!({
                "unique_id": "fphammerle/wireless-sensor-mqtt/FT017TH/bed-room-sensor/temperature-degrees-celsius",
                "device_class": "temperature",
                "name": "bed-room-sensor temperature",
                "state_topic": "living-room/ft017th/temp",
                "unit_of_measurement": "°C",
                "expire_after": 600,
                "device": {
                    "identifiers": ["FT017TH/bed-room-sensor"],
                    "model": "FT017TH",
                },
            })
        );
    }

    #[test]
    fn test_humidity_document() {
        let config = DiscoveryConfig::new(
            "bed-room-sensor",
            MeasurementKind::RelativeHumidity,
            "living-room/ft017th/rel-humidity",
        );

        assert_eq!(
            config.unique_id,
            "fphammerle/wireless-sensor-mqtt/FT017TH/bed-room-sensor/relative-humidity-percent"
        );
        assert_eq!(config.device_class, "humidity");
        assert_eq!(config.name, "bed-room-sensor relative humidity");
        assert_eq!(config.unit_of_measurement, "%");
        assert_eq!(config.expire_after, 600);
    }

    #[test]
    fn test_payload_field_order() {
        let payload =
            DiscoveryConfig::new("n", MeasurementKind::Temperature, "t").to_payload();
        let positions: Vec<usize> = [
            "\"unique_id\"",
            "\"device_class\"",
            "\"name\"",
            "\"state_topic\"",
            "\"unit_of_measurement\"",
            "\"expire_after\"",
            "\"device\"",
        ]
        .iter()
        .map(|field| payload.find(field).unwrap())
        .collect();

        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn test_publish_discovery_config() {
        let transport = crate::testing::MockTransport::new();

        let outcomes = publish_discovery_config(
            &transport,
            "homeassistant",
            "FT017TH",
            "wireless-sensor/FT017TH/temperature-degrees-celsius",
            "wireless-sensor/FT017TH/relative-humidity-percent",
        )
        .await;
        assert!(outcomes.iter().all(PublishOutcome::is_confirmed));

        let published = transport.get_published_messages().await;
        assert_eq!(published.len(), 2);
        assert_eq!(
            published[0].topic,
            "homeassistant/sensor/FT017TH/temperature-degrees-celsius/config"
        );
        assert_eq!(
            published[1].topic,
            "homeassistant/sensor/FT017TH/relative-humidity-percent/config"
        );
        assert!(published.iter().all(|message| message.retain));

        let humidity: serde_json::Value = serde_json::from_str(&published[1].payload).unwrap();
        assert_eq!(
            humidity["state_topic"],
            "wireless-sensor/FT017TH/relative-humidity-percent"
        );
    }
}
