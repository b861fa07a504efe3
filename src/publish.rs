//! Publish-confirmation gate
//!
//! Issues one publish request and polls its delivery token at a fixed
//! interval until the broker acknowledges it or the timeout elapses. The
//! outcome is classified and logged here; it is never an error for the caller.

use crate::transport::{PublishStatus, ReturnCode, Transport};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Poll interval and maximum wait for a broker acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(16),
        }
    }
}

/// Outcome of a single publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Broker acknowledged the message within the timeout
    Confirmed,
    /// Request accepted but no acknowledgment within the timeout
    TimedOut,
    /// Request rejected by the client library
    Failed(ReturnCode),
}

impl PublishOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

/// Publish with the default policy (1 s interval, 16 s timeout)
pub async fn confirm_publish<T: Transport + ?Sized>(
    transport: &T,
    topic: &str,
    payload: &str,
    retain: bool,
) -> PublishOutcome {
    confirm_publish_with(
        transport,
        topic,
        payload,
        retain,
        &ConfirmationPolicy::default(),
    )
    .await
}

/// Publish once and wait at most `policy.timeout` for the acknowledgment
///
/// A rejected request returns [`PublishOutcome::Failed`] without polling.
/// No retries are performed.
pub async fn confirm_publish_with<T: Transport + ?Sized>(
    transport: &T,
    topic: &str,
    payload: &str,
    retain: bool,
    policy: &ConfirmationPolicy,
) -> PublishOutcome {
    debug!("publishing mqtt msg: topic={} payload={}", topic, payload);
    let started = Instant::now();
    let request = transport
        .publish(topic, payload.as_bytes().to_vec(), retain)
        .await;

    if let PublishStatus::Rejected(code) = request.status {
        error!(
            topic = %topic,
            return_code = code.0,
            "failed to publish on topic {} (return code {})",
            topic,
            code
        );
        return PublishOutcome::Failed(code);
    }

    loop {
        if request.delivery.is_published() {
            return PublishOutcome::Confirmed;
        }
        if started.elapsed() >= policy.timeout {
            warn!(
                topic = %topic,
                timeout_secs = policy.timeout.as_secs(),
                "reached timeout of {} seconds while waiting for MQTT message on topic {} to get published",
                policy.timeout.as_secs(),
                topic
            );
            return PublishOutcome::TimedOut;
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}
