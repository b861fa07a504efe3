//! Transport layer for publishing measurements
//!
//! This module provides the broker session abstraction and its MQTT
//! implementation. A publish yields the request status and a delivery token;
//! callers bound how long they wait for the broker's acknowledgment.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod mqtt;

/// Broker session abstraction
///
/// Enables dependency injection of [`mqtt::MqttClient`] or a test double.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the broker and wait for its acknowledgment
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Close the session
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Issue a single publish request
    ///
    /// Never waits for the broker's acknowledgment; poll the returned
    /// [`DeliveryToken`] for that.
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> PublishRequest;

    /// Fail if the session was lost since connecting
    fn check_connection(&self) -> Result<(), Self::Error>;
}

/// Non-success status code of a publish request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReturnCode(pub i32);

impl ReturnCode {
    /// The session is not connected (request queue closed)
    pub const NO_CONNECTION: ReturnCode = ReturnCode(4);
    /// The outgoing request queue is full
    pub const QUEUE_FULL: ReturnCode = ReturnCode(15);
    /// The request was refused by the client library before sending
    pub const REFUSED: ReturnCode = ReturnCode(13);
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a publish request as reported by the client library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    /// Request accepted for delivery
    Accepted,
    /// Request rejected, the message will never be sent
    Rejected(ReturnCode),
}

/// Tracks whether the broker acknowledged a published message
#[derive(Debug, Clone, Default)]
pub struct DeliveryToken {
    published: Arc<AtomicBool>,
}

impl DeliveryToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that is published from the start
    pub fn published() -> Self {
        let token = Self::new();
        token.mark_published();
        token
    }

    pub fn is_published(&self) -> bool {
        self.published.load(Ordering::Acquire)
    }

    pub fn mark_published(&self) {
        self.published.store(true, Ordering::Release);
    }
}

/// Result of issuing a publish request
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub status: PublishStatus,
    pub delivery: DeliveryToken,
}

impl PublishRequest {
    pub fn accepted(delivery: DeliveryToken) -> Self {
        Self {
            status: PublishStatus::Accepted,
            delivery,
        }
    }

    /// Rejected request, its token never resolves
    pub fn rejected(code: ReturnCode) -> Self {
        Self {
            status: PublishStatus::Rejected(code),
            delivery: DeliveryToken::new(),
        }
    }
}
