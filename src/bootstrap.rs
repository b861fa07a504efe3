//! Session bootstrap
//!
//! Validates the configuration before any network activity, then wires the
//! broker session and the measurement source together and runs the relay
//! loop. The broker session is closed on every exit path once it was created.

use crate::config::{BridgeConfig, ConfigError, SensorSection};
use crate::error::{BridgeError, BridgeResult};
use crate::publish::ConfirmationPolicy;
use crate::relay::{RelaySession, SessionIdentity};
use crate::sensor::receiver::ReceiverOptions;
use crate::sensor::{MeasurementSource, MockMeasurementSource, ReceiverProcess};
use crate::transport::mqtt::{BrokerSettings, MqttClient};
use crate::transport::Transport;
use std::convert::Infallible;
use tracing::{debug, info, warn, Instrument};

/// Run the bridge against the configured broker and receiver
///
/// Only returns on failure; see [`crate::relay::RelaySession::run`].
pub async fn run(config: &BridgeConfig) -> BridgeResult<Infallible> {
    run_with(
        config,
        |settings| MqttClient::new(settings.clone()),
        open_measurement_source,
        &ConfirmationPolicy::default(),
    )
    .await
}

/// Measurement source selected by the sensor settings
pub fn open_measurement_source(
    section: &SensorSection,
) -> BridgeResult<Box<dyn MeasurementSource>> {
    if section.mock_measurements {
        return Ok(Box::new(MockMeasurementSource::new()));
    }

    let gdo0_gpio_line_name = section
        .gdo0_gpio_line_name
        .clone()
        .ok_or(ConfigError::MissingField("sensor.gdo0_gpio_line_name"))?;
    let options = ReceiverOptions {
        command: section.receiver_command.clone(),
        gdo0_gpio_line_name,
        unlock_spi_device: section.unlock_spi_device,
        debug_cc1101: section.debug_cc1101,
        receive_timeout: section.receive_timeout(),
    };
    Ok(Box::new(ReceiverProcess::spawn(&options)?))
}

/// Run the bridge with injected transport and measurement source factories
///
/// `transport_factory` is not invoked when the configuration is invalid.
pub async fn run_with<T, F, S, G>(
    config: &BridgeConfig,
    transport_factory: F,
    source_factory: G,
    policy: &ConfirmationPolicy,
) -> BridgeResult<Infallible>
where
    T: Transport,
    F: FnOnce(&BrokerSettings) -> T,
    S: MeasurementSource,
    G: FnOnce(&SensorSection) -> BridgeResult<S>,
    BridgeError: From<T::Error>,
{
    config.validate()?;
    let settings = BrokerSettings::from_config(&config.mqtt)?;
    let identity = SessionIdentity::from_config(config);

    let span = crate::session_span!(node_id = %identity.node_id);
    let mut session = RelaySession::new(identity, *policy);

    info!(
        "connecting to MQTT broker {}:{} (TLS {})",
        settings.host,
        settings.port,
        settings.tls_label()
    );
    let mut transport = transport_factory(&settings);

    let result = connect_and_relay(&mut transport, &settings, &mut session, || {
        source_factory(&config.sensor)
    })
    .instrument(span)
    .await;

    if let Err(e) = transport.disconnect().await {
        warn!("failed to disconnect from MQTT broker: {}", BridgeError::from(e));
    }
    result
}

async fn connect_and_relay<T, S>(
    transport: &mut T,
    settings: &BrokerSettings,
    session: &mut RelaySession,
    open_source: impl FnOnce() -> BridgeResult<S>,
) -> BridgeResult<Infallible>
where
    T: Transport,
    S: MeasurementSource,
    BridgeError: From<T::Error>,
{
    if let Err(e) = transport.connect().await {
        return Err(session.terminate(BridgeError::from(e)));
    }
    debug!("connected to MQTT broker {}:{}", settings.host, settings.port);

    let mut source = match open_source() {
        Ok(source) => source,
        Err(e) => return Err(session.terminate(e)),
    };
    let topics = session.topics();
    debug!(
        "publishing measurements on topics '{}' and '{}'",
        topics.temperature, topics.humidity
    );
    session.run(&*transport, &mut source).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::SessionPhase;
    use crate::testing::{measurement, MockTransport, ScriptedMeasurementSource};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_password_without_username_never_creates_transport() {
        let mut config = BridgeConfig::test_config();
        config.mqtt.password = Some("secret".to_string());
        let factory_called = AtomicBool::new(false);

        let result = run_with(
            &config,
            |_| {
                factory_called.store(true, Ordering::SeqCst);
                MockTransport::new()
            },
            |_| Ok(ScriptedMeasurementSource::default()),
            &ConfirmationPolicy::default(),
        )
        .await;

        assert!(matches!(
            result,
            Err(BridgeError::Config(ConfigError::MissingUsername))
        ));
        assert!(!factory_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_invalid_node_id_never_creates_transport() {
        let mut config = BridgeConfig::test_config();
        config.homeassistant.node_id = "living room".to_string();
        let factory_called = AtomicBool::new(false);

        let result = run_with(
            &config,
            |_| {
                factory_called.store(true, Ordering::SeqCst);
                MockTransport::new()
            },
            |_| Ok(ScriptedMeasurementSource::default()),
            &ConfirmationPolicy::default(),
        )
        .await;

        let error = result.unwrap_err();
        assert!(error.is_configuration_error());
        assert!(!factory_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_without_reading_measurements() {
        let config = BridgeConfig::test_config();
        let transport = MockTransport::with_connect_failure();
        let source_opened = AtomicBool::new(false);

        let result = run_with(
            &config,
            |_| transport.clone(),
            |_| {
                source_opened.store(true, Ordering::SeqCst);
                Ok(ScriptedMeasurementSource::default())
            },
            &ConfirmationPolicy::default(),
        )
        .await;

        let error = result.unwrap_err();
        assert_eq!(error.to_string(), "Transport error: Mock connection failure");
        assert!(!source_opened.load(Ordering::SeqCst));
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_session_disconnects_after_stream_timeout() {
        let config = BridgeConfig::test_config();
        let transport = MockTransport::new();

        let result = run_with(
            &config,
            |settings| {
                assert_eq!(settings.host, "mqtt-broker.local");
                assert_eq!(settings.port, 8883);
                transport.clone()
            },
            |section| {
                assert_eq!(section.gdo0_gpio_line_name.as_deref(), Some("GPIO24"));
                Ok(ScriptedMeasurementSource::new([measurement(23.1234567, 0.501234567)]))
            },
            &ConfirmationPolicy::default(),
        )
        .await;

        assert!(matches!(result, Err(BridgeError::MeasurementStreamTimeout)));
        assert_eq!(transport.get_published_messages().await.len(), 4);
        assert!(!transport.is_connected());
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_mode_relays_three_measurements() {
        let mut config = BridgeConfig::test_config();
        config.sensor.mock_measurements = true;
        config.sensor.gdo0_gpio_line_name = None;
        let transport = MockTransport::new();
        let started = tokio::time::Instant::now();

        let result = run_with(
            &config,
            |_| transport.clone(),
            open_measurement_source,
            &ConfirmationPolicy::default(),
        )
        .await;

        assert!(matches!(result, Err(BridgeError::MeasurementStreamTimeout)));
        assert_eq!(started.elapsed(), Duration::from_secs(24));

        let published = transport.get_published_messages().await;
        assert_eq!(published.len(), 2 + 3 * 2);
        for pair in published[2..].chunks(2) {
            let temperature: f64 = pair[0].payload.parse().unwrap();
            let humidity: f64 = pair[1].payload.parse().unwrap();
            assert!((20.0..=30.0).contains(&temperature));
            assert!((40.0..=60.0).contains(&humidity));
        }
    }

    #[test]
    fn test_open_source_requires_gpio_line_outside_mock_mode() {
        let section = SensorSection::default();
        assert!(matches!(
            open_measurement_source(&section),
            Err(BridgeError::Config(ConfigError::MissingField(_)))
        ));
    }

    fn test_session() -> (BrokerSettings, RelaySession) {
        let config = BridgeConfig::test_config();
        let settings = BrokerSettings::from_config(&config.mqtt).unwrap();
        let identity = SessionIdentity::from_config(&config);
        (settings, RelaySession::new(identity, ConfirmationPolicy::default()))
    }

    #[test]
    fn test_new_session_starts_connecting() {
        let (_, session) = test_session();
        assert_eq!(session.phase(), &SessionPhase::Connecting);
    }

    #[tokio::test]
    async fn test_connect_failure_terminates_session() {
        let (settings, mut session) = test_session();
        let mut transport = MockTransport::with_connect_failure();

        let error = connect_and_relay(&mut transport, &settings, &mut session, || {
            Ok(ScriptedMeasurementSource::default())
        })
        .await
        .unwrap_err();

        assert_eq!(
            session.phase(),
            &SessionPhase::Terminated(error.to_string())
        );
        assert!(!session.discovery_published());
    }

    #[tokio::test]
    async fn test_source_failure_terminates_session() {
        let (settings, mut session) = test_session();
        let mut transport = MockTransport::new();

        let error = connect_and_relay(&mut transport, &settings, &mut session, || {
            Err::<ScriptedMeasurementSource, _>(
                ConfigError::MissingField("sensor.gdo0_gpio_line_name").into(),
            )
        })
        .await
        .unwrap_err();

        assert!(error.is_configuration_error());
        assert_eq!(
            session.phase(),
            &SessionPhase::Terminated(error.to_string())
        );
        assert!(transport.get_published_messages().await.is_empty());
    }
}
