//! Transport layer for broker communication
//!
//! Commands talk to the broker only through the [`Broker`] trait so they can be
//! driven by the live [`mqtt::Session`] or by the mock in [`crate::testing`].

use bytes::Bytes;
use rumqttc::QoS;

pub mod mqtt;

/// Broker operations used by the command layer
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Subscribe to a topic filter. `retain_as_published` asks the broker to keep
    /// the original retain flag on forwarded messages.
    async fn subscribe(&self, filter: &str, retain_as_published: bool)
        -> Result<(), Self::Error>;

    /// Publish with an explicit QoS. A `None` payload is sent as an empty message,
    /// which together with `retain` clears the topic's retained value.
    async fn publish_with_qos(
        &self,
        topic: &str,
        payload: Option<Bytes>,
        retain: bool,
        qos: QoS,
    ) -> Result<(), Self::Error>;

    /// Publish at QoS 1
    async fn publish(
        &self,
        topic: &str,
        payload: Option<Bytes>,
        retain: bool,
    ) -> Result<(), Self::Error> {
        self.publish_with_qos(topic, payload, retain, QoS::AtLeastOnce)
            .await
    }

    /// Clear the retained value of one topic
    async fn clear_retained(&self, topic: &str) -> Result<(), Self::Error> {
        self.publish(topic, None, true).await
    }
}
