//! Pure routing of MQTT events
//!
//! Maps raw `rumqttc` events onto the few cases the event-loop driver cares
//! about: session establishment, publish progress and disconnection.

use rumqttc::v5::mqttbytes::v5::{Packet, PubAckReason};
use rumqttc::v5::Event;
use rumqttc::Outgoing;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::PubAck(puback) => match puback.reason {
                    PubAckReason::Success | PubAckReason::NoMatchingSubscribers => {
                        EventRoute::PublishAcknowledged {
                            packet_id: puback.pkid,
                        }
                    }
                    reason => EventRoute::PublishRefusedByBroker {
                        packet_id: puback.pkid,
                        reason: format!("{reason:?}"),
                    },
                },
                Packet::Disconnect(_) => EventRoute::DisconnectedByBroker,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Publish(packet_id)) => EventRoute::PublishSent {
                packet_id: *packet_id,
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish
    ConnectionAcknowledged,
    /// Publish written to the network; packet id 0 for QoS 0
    PublishSent { packet_id: u16 },
    /// Broker accepted a QoS 1 publish
    PublishAcknowledged { packet_id: u16 },
    /// Broker answered a QoS 1 publish with an error reason code
    PublishRefusedByBroker { packet_id: u16, reason: String },
    /// Broker closed the session
    DisconnectedByBroker,
    /// Our own disconnect request went out
    DisconnectSent,
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Other outgoing event (handled automatically)
    OutgoingEvent,
}
