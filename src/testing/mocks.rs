//! Mock implementations for testing
//!
//! Provides a mock Transport and a scripted MeasurementSource so the relay
//! loop can be exercised without a broker or a receiver.

use crate::error::BridgeError;
use crate::sensor::{Measurement, MeasurementSource, SensorError};
use crate::transport::{DeliveryToken, PublishRequest, ReturnCode, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// A message recorded by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// How the mock broker acknowledges publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckBehavior {
    /// Acknowledged before `publish` returns
    #[default]
    Immediate,
    /// Acknowledged after the given delay
    After(Duration),
    /// Accepted but never acknowledged
    Never,
    /// Rejected with the given return code
    Reject(ReturnCode),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockTransportError {
    #[error("Mock connection failure")]
    ConnectFailed,
    #[error("Mock connection lost")]
    ConnectionLost,
}

impl From<MockTransportError> for BridgeError {
    fn from(error: MockTransportError) -> Self {
        BridgeError::transport(error)
    }
}

/// Mock transport for testing
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub ack_behavior: AckBehavior,
    pub should_fail_connect: bool,
    connected: Arc<AtomicBool>,
    connection_lost: Arc<AtomicBool>,
    connect_count: Arc<AtomicUsize>,
    disconnect_count: Arc<AtomicUsize>,
    /// Drop the session once this many messages were published
    lose_connection_after: Option<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ack_behavior(ack_behavior: AckBehavior) -> Self {
        Self {
            ack_behavior,
            ..Default::default()
        }
    }

    pub fn with_connect_failure() -> Self {
        Self {
            should_fail_connect: true,
            ..Default::default()
        }
    }

    /// Report a lost session after `count` publishes
    pub fn losing_connection_after(count: usize) -> Self {
        Self {
            lose_connection_after: Some(count),
            ..Default::default()
        }
    }

    pub fn fail_connection_check(&self) {
        self.connection_lost.store(true, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_count.load(Ordering::SeqCst)
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.published_messages.lock().await.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail_connect {
            return Err(MockTransportError::ConnectFailed);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> PublishRequest {
        let published_count = {
            let mut published = self.published_messages.lock().await;
            published.push(PublishedMessage {
                topic: topic.to_string(),
                payload: String::from_utf8_lossy(&payload).into_owned(),
                retain,
            });
            published.len()
        };
        if self
            .lose_connection_after
            .is_some_and(|limit| published_count >= limit)
        {
            self.connection_lost.store(true, Ordering::SeqCst);
        }

        match self.ack_behavior {
            AckBehavior::Immediate => PublishRequest::accepted(DeliveryToken::published()),
            AckBehavior::After(delay) => {
                let token = DeliveryToken::new();
                let marker = token.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    marker.mark_published();
                });
                PublishRequest::accepted(token)
            }
            AckBehavior::Never => PublishRequest::accepted(DeliveryToken::new()),
            AckBehavior::Reject(code) => PublishRequest::rejected(code),
        }
    }

    fn check_connection(&self) -> Result<(), Self::Error> {
        if self.connection_lost.load(Ordering::SeqCst) {
            Err(MockTransportError::ConnectionLost)
        } else {
            Ok(())
        }
    }
}

/// One scripted step of [`ScriptedMeasurementSource`]
#[derive(Debug)]
pub enum ScriptedStep {
    Measurement(Measurement),
    Error(SensorError),
}

/// Measurement source replaying a fixed script, then ending the sequence
#[derive(Debug, Default)]
pub struct ScriptedMeasurementSource {
    steps: VecDeque<ScriptedStep>,
    delivered: Arc<AtomicUsize>,
}

impl ScriptedMeasurementSource {
    pub fn new(measurements: impl IntoIterator<Item = Measurement>) -> Self {
        Self {
            steps: measurements
                .into_iter()
                .map(ScriptedStep::Measurement)
                .collect(),
            delivered: Arc::default(),
        }
    }

    /// Fail with `error` once the scripted measurements are consumed
    pub fn then_fail(mut self, error: SensorError) -> Self {
        self.steps.push_back(ScriptedStep::Error(error));
        self
    }

    /// Shared counter of measurements handed out
    pub fn delivered(&self) -> Arc<AtomicUsize> {
        self.delivered.clone()
    }
}

#[async_trait]
impl MeasurementSource for ScriptedMeasurementSource {
    async fn next_measurement(&mut self) -> Result<Option<Measurement>, SensorError> {
        match self.steps.pop_front() {
            Some(ScriptedStep::Measurement(measurement)) => {
                self.delivered.fetch_add(1, Ordering::SeqCst);
                Ok(Some(measurement))
            }
            Some(ScriptedStep::Error(error)) => Err(error),
            None => Ok(None),
        }
    }
}

/// Measurement without a decoding timestamp
pub fn measurement(temperature_degrees_celsius: f64, relative_humidity: f64) -> Measurement {
    Measurement {
        decoding_timestamp: None,
        temperature_degrees_celsius,
        relative_humidity,
    }
}
