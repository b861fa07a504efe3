//! Impure I/O operations for MQTT client
//!
//! This module handles network communication and async coordination with the
//! rumqttc event loop. There is no reconnection: once the session drops, the
//! client stays disconnected and reports it through `check_connection`.

use super::connection::{
    configure_mqtt_options, BrokerSettings, ConnectionState, MqttError, PUBLISH_QOS,
};
use super::delivery::DeliveryTracker;
use super::message_handler::{EventRoute, MessageHandler};
use crate::transport::{PublishRequest, ReturnCode, Transport};
use async_trait::async_trait;
use rumqttc::v5::{AsyncClient, ClientError, EventLoop};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the request channel between client and event loop
const REQUEST_CHANNEL_CAPACITY: usize = 10;

const CONNACK_TIMEOUT: Duration = Duration::from_secs(30);
const DISCONNECT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// MQTT broker session for the bridge
pub struct MqttClient {
    settings: BrokerSettings,
    client: AsyncClient,
    /// Taken by `connect`; the lock only makes the client `Sync`
    event_loop: StdMutex<Option<EventLoop>>,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    deliveries: Arc<Mutex<DeliveryTracker>>,
}

impl MqttClient {
    pub fn new(settings: BrokerSettings) -> Self {
        let mqtt_options = configure_mqtt_options(&settings);
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        MqttClient {
            settings,
            client,
            event_loop: StdMutex::new(Some(event_loop)),
            event_loop_handle: None,
            state_rx: None,
            shutdown_tx: None,
            deliveries: Arc::new(Mutex::new(DeliveryTracker::new())),
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Create connection state and shutdown channels
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailed(
                        "State channel closed".to_string(),
                    ));
                }
                match *state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(ref reason) => {
                        return Err(MqttError::ConnectionFailed(reason.clone()));
                    }
                    ConnectionState::Connecting => continue,
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailed(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Connect and wait for the broker's ConnAck
    ///
    /// Spawns the event-loop driver, which tracks connection state and
    /// delivery acknowledgments until the session ends.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let event_loop = match self.event_loop.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
        .ok_or_else(|| MqttError::ConnectionFailed("Event loop already started".to_string()))?;

        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) = Self::setup_connection_channels();
        self.state_rx = Some(state_rx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let deliveries = self.deliveries.clone();
        let handle = tokio::spawn(Self::drive_event_loop(
            event_loop,
            state_tx,
            shutdown_rx,
            deliveries,
        ));
        self.event_loop_handle = Some(handle);

        Self::wait_for_connection_confirmation(state_rx, CONNACK_TIMEOUT).await
    }

    /// Poll the event loop until shutdown, disconnect or the first error
    async fn drive_event_loop(
        mut event_loop: EventLoop,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
        deliveries: Arc<Mutex<DeliveryTracker>>,
    ) {
        debug!("Starting MQTT event loop");
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("Shutdown signal received, stopping MQTT event loop");
                        break;
                    }
                }
                event_result = event_loop.poll() => {
                    let event = match event_result {
                        Ok(event) => event,
                        Err(e) => {
                            error!("MQTT event loop error: {}", e);
                            let _ = state_tx.send(ConnectionState::Disconnected(e.to_string()));
                            break;
                        }
                    };
                    match MessageHandler::route_mqtt_event(&event) {
                        EventRoute::ConnectionAcknowledged => {
                            let _ = state_tx.send(ConnectionState::Connected);
                        }
                        EventRoute::PublishSent { packet_id } => {
                            deliveries.lock().await.on_publish_sent(packet_id);
                        }
                                    EventRoute::PublishAcknowledged { packet_id } => {
                            deliveries.lock().await.on_publish_acknowledged(packet_id);
                        }
                        EventRoute::PublishRefusedByBroker { packet_id, reason } => {
                            deliveries.lock().await.on_publish_refused(packet_id, &reason);
                        }
                        EventRoute::DisconnectedByBroker => {
                            warn!("MQTT broker closed the session");
                            let _ = state_tx.send(ConnectionState::Disconnected(
                                "Disconnected by broker".to_string(),
                            ));
                            break;
                        }
                        EventRoute::DisconnectSent => {
                            let _ = state_tx.send(ConnectionState::Disconnected(
                                "Client disconnected".to_string(),
                            ));
                            break;
                        }
                        EventRoute::InfrastructureEvent(event_str) => {
                            tracing::trace!(target: "mqtt_transport", "MQTT event: {}", event_str);
                        }
                        EventRoute::OutgoingEvent => {}
                    }
                }
            }
        }
        debug!("MQTT event loop stopped");
    }

    /// Get current connection state
    /// Returns None if connection hasn't been started yet
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Check connection state before operations
    pub fn check_connection(&self) -> Result<(), MqttError> {
        match self.connection_state() {
            Some(ConnectionState::Connected) => Ok(()),
            Some(ConnectionState::Disconnected(reason)) => Err(MqttError::ConnectionLost(reason)),
            Some(state) => Err(MqttError::NotConnected { state }),
            None => Err(MqttError::NotConnected {
                state: ConnectionState::Disconnected("Client not connected".to_string()),
            }),
        }
    }

    /// Issue one publish request without waiting for the acknowledgment
    pub async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> PublishRequest {
        if let Err(e) = self.check_connection() {
            debug!("Refusing to publish on {}: {}", topic, e);
            return PublishRequest::rejected(ReturnCode::NO_CONNECTION);
        }

        let token = self.deliveries.lock().await.register();
        match self.client.publish(topic, PUBLISH_QOS, retain, payload).await {
            Ok(()) => PublishRequest::accepted(token),
            Err(e) => {
                self.deliveries.lock().await.cancel_last();
                debug!("Publish request on {} refused: {}", topic, e);
                PublishRequest::rejected(Self::return_code(&e, self.check_connection().is_ok()))
            }
        }
    }

    fn return_code(error: &ClientError, connected: bool) -> ReturnCode {
        match error {
            ClientError::TryRequest(_) => ReturnCode::QUEUE_FULL,
            _ if !connected => ReturnCode::NO_CONNECTION,
            _ => ReturnCode::REFUSED,
        }
    }

    /// Disconnect from the broker, waiting briefly for the event loop to flush
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let Some(mut handle) = self.event_loop_handle.take() else {
            return Ok(());
        };

        let disconnect_result = if self.check_connection().is_ok() {
            self.client
                .disconnect()
                .await
                .map_err(MqttError::DisconnectFailed)
        } else {
            Ok(())
        };

        match tokio::time::timeout(DISCONNECT_GRACE_PERIOD, &mut handle).await {
            Ok(Ok(())) => debug!("Event loop task shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("Event loop task ended with error: {}", e),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("Event loop task didn't shut down gracefully, aborting");
                handle.abort();
            }
        }

        info!(
            "disconnected from MQTT broker {}:{}",
            self.settings.host, self.settings.port
        );
        disconnect_result
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> PublishRequest {
        MqttClient::publish(self, topic, payload, retain).await
    }

    fn check_connection(&self) -> Result<(), Self::Error> {
        MqttClient::check_connection(self)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        // Drop can't await disconnect(), only stop the background task
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PublishStatus;

    fn test_settings() -> BrokerSettings {
        BrokerSettings {
            host: "localhost".to_string(),
            port: 1883,
            tls: false,
            username: None,
            password: None,
        }
    }

    #[test]
    fn test_setup_connection_channels() {
        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) =
            MqttClient::setup_connection_channels();

        assert_eq!(*state_rx.borrow(), ConnectionState::Connecting);
        assert!(!(*shutdown_rx.borrow()));

        state_tx.send(ConnectionState::Connected).unwrap();
        assert_eq!(*state_rx.borrow(), ConnectionState::Connected);

        shutdown_tx.send(true).unwrap();
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_success() {
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(ConnectionState::Connected);
        });

        let result =
            MqttClient::wait_for_connection_confirmation(state_rx, Duration::from_millis(100))
                .await;
        assert!(result.is_ok(), "Should successfully wait for connection");
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_timeout() {
        // keep the sender alive so the channel doesn't close
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();

        let result =
            MqttClient::wait_for_connection_confirmation(state_rx, Duration::from_millis(10)).await;
        drop(state_tx);

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("ConnAck"), "got: {err_msg}");
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_refused() {
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(ConnectionState::Disconnected(
                "Connection refused, return code: `NotAuthorized`".to_string(),
            ));
        });

        let result =
            MqttClient::wait_for_connection_confirmation(state_rx, Duration::from_millis(100))
                .await;
        assert!(matches!(result, Err(MqttError::ConnectionFailed(ref reason)) if reason.contains("NotAuthorized")));
    }

    fn assert_transport<T: Transport>() {}

    #[test]
    fn test_mqtt_client_is_a_transport() {
        assert_transport::<MqttClient>();
    }

    #[tokio::test]
    async fn test_second_connect_fails() {
        let mut settings = test_settings();
        settings.port = 1;
        let mut client = MqttClient::new(settings);

        let _ = client.connect().await;
        let result = client.connect().await;
        assert!(matches!(result, Err(MqttError::ConnectionFailed(ref reason)) if reason.contains("already started")));
    }

    #[tokio::test]
    async fn test_connection_state_before_connect() {
        let client = MqttClient::new(test_settings());

        assert!(client.connection_state().is_none());
        assert!(matches!(
            client.check_connection(),
            Err(MqttError::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_rejected_without_connection() {
        let client = MqttClient::new(test_settings());

        let request = client.publish("some/topic", b"1".to_vec(), false).await;
        assert_eq!(
            request.status,
            PublishStatus::Rejected(ReturnCode::NO_CONNECTION)
        );
        assert!(!request.delivery.is_published());
        assert_eq!(client.deliveries.lock().await.pending(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let mut client = MqttClient::new(test_settings());
        assert!(client.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_broker_fails() {
        let mut settings = test_settings();
        // reserved port, nothing listens there
        settings.port = 1;
        let mut client = MqttClient::new(settings);

        let result = client.connect().await;
        assert!(matches!(result, Err(MqttError::ConnectionFailed(_))));
        assert!(matches!(
            client.check_connection(),
            Err(MqttError::ConnectionLost(_))
        ));
    }
}
