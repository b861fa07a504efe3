//! Delivery acknowledgment bookkeeping
//!
//! `rumqttc` assigns packet ids only when a queued publish is written to the
//! network, in request order. Tokens therefore wait in a FIFO until the
//! matching `Outgoing::Publish(pkid)` event, then in a map until `PubAck`.

use crate::transport::DeliveryToken;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct DeliveryTracker {
    awaiting_packet_id: VecDeque<DeliveryToken>,
    in_flight: HashMap<u16, DeliveryToken>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token before queueing its publish request
    pub fn register(&mut self) -> DeliveryToken {
        let token = DeliveryToken::new();
        self.awaiting_packet_id.push_back(token.clone());
        token
    }

    /// Drop the most recent registration after the request was refused
    pub fn cancel_last(&mut self) {
        self.awaiting_packet_id.pop_back();
    }

    pub fn on_publish_sent(&mut self, packet_id: u16) {
        let Some(token) = self.awaiting_packet_id.pop_front() else {
            tracing::debug!(packet_id, "publish sent without registered delivery token");
            return;
        };
        if packet_id == 0 {
            // QoS 0 is never acknowledged, sending is all there is
            token.mark_published();
        } else {
            self.in_flight.insert(packet_id, token);
        }
    }

    pub fn on_publish_acknowledged(&mut self, packet_id: u16) {
        if let Some(token) = self.in_flight.remove(&packet_id) {
            token.mark_published();
        }
    }

    /// Forget a publish the broker refused; its token never resolves
    pub fn on_publish_refused(&mut self, packet_id: u16, reason: &str) {
        if self.in_flight.remove(&packet_id).is_some() {
            tracing::warn!(packet_id, reason, "broker refused publish");
        }
    }

    /// Tokens not yet acknowledged
    pub fn pending(&self) -> usize {
        self.awaiting_packet_id.len() + self.in_flight.len()
    }
}
