//! Pure message routing for MQTT events
//!
//! Both protocol revisions are normalized into one [`EventRoute`] so the session
//! supervisor handles a single event shape.

use bytes::Bytes;
use rumqttc::QoS;
use tracing::{debug, warn};

/// One message delivered by the broker on an active subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
    pub qos: u8,
    /// Packet identifier, 0 for QoS 0 deliveries
    pub pkid: u16,
}

impl Delivery {
    /// An empty retained delivery is the broker echoing a cleared retained value
    pub fn is_retained_clear(&self) -> bool {
        self.retain && self.payload.is_empty()
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish/subscribe
    ConnectionAcknowledged,
    /// Message received on a subscribed filter
    MessageReceived(Delivery),
    /// Broker sent DISCONNECT
    Disconnected,
    /// SubAck with the per-filter return codes
    SubscriptionConfirmed { packet_id: u16, codes: String },
    /// Infrastructure event (PingResp, PubAck, ...)
    InfrastructureEvent(String),
    /// Outgoing event (handled by the transport)
    OutgoingEvent,
}

pub struct MessageHandler;

impl MessageHandler {
    /// Route an MQTT 5 event
    pub fn route_v5_event(event: &rumqttc::v5::Event) -> EventRoute {
        use rumqttc::v5::mqttbytes::v5::Packet;
        use rumqttc::v5::Event;

        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived(Delivery {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                    retain: publish.retain,
                    qos: v5_qos_level(publish.qos),
                    pkid: publish.pkid,
                }),
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    codes: format!("{:?}", suback.return_codes),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Route an MQTT 3.1.1 event
    pub fn route_v4_event(event: &rumqttc::Event) -> EventRoute {
        use rumqttc::{Event, Packet, SubscribeReasonCode};

        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived(Delivery {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                    retain: publish.retain,
                    qos: qos_level(publish.qos),
                    pkid: publish.pkid,
                }),
                Packet::Disconnect => EventRoute::Disconnected,
                Packet::SubAck(suback) => {
                    let failed = suback
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure));
                    if failed {
                        warn!("Broker rejected subscription {}", suback.pkid);
                    }
                    EventRoute::SubscriptionConfirmed {
                        packet_id: suback.pkid,
                        codes: format!("{:?}", suback.return_codes),
                    }
                }
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Keep only retained deliveries that still carry a value
    pub fn should_clear(delivery: &Delivery) -> bool {
        if !delivery.retain {
            debug!("Ignoring live message on topic: {}", delivery.topic);
            return false;
        }
        !delivery.payload.is_empty()
    }
}

pub fn qos_level(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

pub fn v5_qos_level(qos: rumqttc::v5::mqttbytes::QoS) -> u8 {
    use rumqttc::v5::mqttbytes::QoS as V5QoS;
    match qos {
        V5QoS::AtMostOnce => 0,
        V5QoS::AtLeastOnce => 1,
        V5QoS::ExactlyOnce => 2,
    }
}

pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(retain: bool, payload: &'static [u8]) -> Delivery {
        Delivery {
            topic: "a/b".to_string(),
            payload: Bytes::from_static(payload),
            retain,
            qos: 1,
            pkid: 7,
        }
    }

    #[test]
    fn test_route_v4_publish() {
        use rumqttc::{Event, Packet, Publish};

        let mut publish = Publish::new("x/y", QoS::AtMostOnce, vec![0xff, 0x00]);
        publish.retain = false;

        match MessageHandler::route_v4_event(&Event::Incoming(Packet::Publish(publish))) {
            EventRoute::MessageReceived(delivery) => {
                assert_eq!(delivery.topic, "x/y");
                assert_eq!(delivery.payload.as_ref(), &[0xff, 0x00]);
                assert!(!delivery.retain);
                assert_eq!(delivery.qos, 0);
            }
            other => panic!("unexpected route: {other:?}"),
        }
    }

    #[test]
    fn test_route_v4_disconnect_and_outgoing() {
        use rumqttc::{Event, Outgoing, Packet};

        assert!(matches!(
            MessageHandler::route_v4_event(&Event::Incoming(Packet::Disconnect)),
            EventRoute::Disconnected
        ));
        assert!(matches!(
            MessageHandler::route_v4_event(&Event::Outgoing(Outgoing::PingReq)),
            EventRoute::OutgoingEvent
        ));
    }

    #[test]
    fn test_should_clear_only_retained_values() {
        assert!(MessageHandler::should_clear(&delivery(true, b"value")));
        assert!(!MessageHandler::should_clear(&delivery(false, b"value")));
        assert!(!MessageHandler::should_clear(&delivery(true, b"")));
    }

    #[test]
    fn test_retained_clear_detection() {
        assert!(delivery(true, b"").is_retained_clear());
        assert!(!delivery(true, b"x").is_retained_clear());
        assert!(!delivery(false, b"").is_retained_clear());
    }

    #[test]
    fn test_qos_level_mapping() {
        for level in 0..=2u8 {
            let qos = qos_from_level(level).unwrap();
            assert_eq!(qos_level(qos), level);
        }
        assert_eq!(qos_from_level(3), None);
    }
}
