//! Measurement relay loop
//!
//! Consumes the measurement sequence and republishes every measurement as two
//! plain-text values. The first measurement of a session triggers the Home
//! Assistant discovery announcement. The loop has no normal exit: the
//! sequence running dry ends the session with
//! [`BridgeError::MeasurementStreamTimeout`].

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::homeassistant::{publish_discovery_config_with, MeasurementKind};
use crate::publish::{confirm_publish_with, ConfirmationPolicy};
use crate::sensor::{Measurement, MeasurementSource};
use crate::transport::Transport;
use std::convert::Infallible;
use std::fmt;
use tracing::debug;

/// Who the bridge publishes as and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Validated at bootstrap, `[A-Za-z0-9_-]+`
    pub node_id: String,
    pub discovery_prefix: String,
    pub topic_prefix: String,
}

impl SessionIdentity {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            node_id: config.homeassistant.node_id.clone(),
            discovery_prefix: config.homeassistant.discovery_prefix.clone(),
            topic_prefix: config.mqtt.topic_prefix.clone(),
        }
    }

    pub fn topics(&self) -> MeasurementTopics {
        MeasurementTopics::new(&self.topic_prefix)
    }
}

/// State topics of one session, fixed for its lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementTopics {
    pub temperature: String,
    pub humidity: String,
}

impl MeasurementTopics {
    pub fn new(topic_prefix: &str) -> Self {
        Self {
            temperature: format!(
                "{topic_prefix}/{}",
                MeasurementKind::Temperature.object_id()
            ),
            humidity: format!(
                "{topic_prefix}/{}",
                MeasurementKind::RelativeHumidity.object_id()
            ),
        }
    }
}

/// Degrees Celsius with two decimals
pub fn format_temperature(temperature_degrees_celsius: f64) -> String {
    format!("{temperature_degrees_celsius:.2}")
}

/// Relative humidity in percent with two decimals
pub fn format_humidity(relative_humidity: f64) -> String {
    format!("{:.2}", relative_humidity * 100.0)
}

/// Lifecycle of a bridge session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    AwaitingFirstMeasurement,
    Relaying,
    Terminated(String),
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::AwaitingFirstMeasurement => write!(f, "awaiting first measurement"),
            Self::Relaying => write!(f, "relaying"),
            Self::Terminated(reason) => write!(f, "terminated ({reason})"),
        }
    }
}

/// Per-session relay state
#[derive(Debug)]
pub struct RelaySession {
    identity: SessionIdentity,
    topics: MeasurementTopics,
    policy: ConfirmationPolicy,
    discovery_published: bool,
    phase: SessionPhase,
}

impl RelaySession {
    pub fn new(identity: SessionIdentity, policy: ConfirmationPolicy) -> Self {
        let topics = identity.topics();
        Self {
            identity,
            topics,
            policy,
            discovery_published: false,
            phase: SessionPhase::Connecting,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn discovery_published(&self) -> bool {
        self.discovery_published
    }

    pub fn topics(&self) -> &MeasurementTopics {
        &self.topics
    }

    fn transition(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "relay session phase changed");
            self.phase = phase;
        }
    }

    /// Announce discovery if needed, then publish both values
    ///
    /// Publish timeouts and rejections are logged by the confirmation gate
    /// and do not fail the measurement.
    pub async fn relay<T>(&mut self, transport: &T, measurement: &Measurement) -> BridgeResult<()>
    where
        T: Transport + ?Sized,
        BridgeError: From<T::Error>,
    {
        debug!("received {}", measurement);
        transport.check_connection()?;

        if !self.discovery_published {
            publish_discovery_config_with(
                transport,
                &self.identity.discovery_prefix,
                &self.identity.node_id,
                &self.topics.temperature,
                &self.topics.humidity,
                &self.policy,
            )
            .await;
            self.discovery_published = true;
        }
        self.transition(SessionPhase::Relaying);

        confirm_publish_with(
            transport,
            &self.topics.temperature,
            &format_temperature(measurement.temperature_degrees_celsius),
            false,
            &self.policy,
        )
        .await;
        confirm_publish_with(
            transport,
            &self.topics.humidity,
            &format_humidity(measurement.relative_humidity),
            false,
            &self.policy,
        )
        .await;
        Ok(())
    }

    /// Relay measurements until the source fails or runs dry
    pub async fn run<T, S>(&mut self, transport: &T, source: &mut S) -> BridgeResult<Infallible>
    where
        T: Transport + ?Sized,
        S: MeasurementSource + ?Sized,
        BridgeError: From<T::Error>,
    {
        self.transition(SessionPhase::AwaitingFirstMeasurement);
        let error = loop {
            let measurement = match source.next_measurement().await {
                Ok(Some(measurement)) => measurement,
                Ok(None) => break BridgeError::MeasurementStreamTimeout,
                Err(e) => break BridgeError::Sensor(e),
            };
            if let Err(e) = self.relay(transport, &measurement).await {
                break e;
            }
        };
        Err(self.terminate(error))
    }

    /// Record the error that ended the session and hand it back
    pub fn terminate(&mut self, error: BridgeError) -> BridgeError {
        self.transition(SessionPhase::Terminated(error.to_string()));
        error
    }
}
