//! `pub <topic> <message>`: publish one message

use crate::error::{CliError, CliResult};
use crate::transport::mqtt::message_handler::qos_from_level;
use crate::transport::Broker;
use bytes::Bytes;
use tracing::info;

pub async fn run<B: Broker>(
    broker: &B,
    topic: &str,
    message: &str,
    retain: bool,
    qos: u8,
) -> CliResult<()> {
    if topic.is_empty() {
        return Err(CliError::invalid_input("topic must not be empty"));
    }
    if topic.contains(['+', '#']) {
        return Err(CliError::invalid_input(format!(
            "cannot publish to wildcard topic '{topic}'"
        )));
    }
    let qos = qos_from_level(qos)
        .ok_or_else(|| CliError::invalid_input(format!("invalid QoS level {qos}")))?;

    broker
        .publish_with_qos(
            topic,
            Some(Bytes::copy_from_slice(message.as_bytes())),
            retain,
            qos,
        )
        .await
        .map_err(CliError::transport)?;

    info!("Published {} bytes to {}", message.len(), topic);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBroker;
    use rumqttc::QoS;

    #[tokio::test]
    async fn test_publishes_message() {
        let broker = MockBroker::new();
        run(&broker, "a/b", "hi", true, 1).await.unwrap();

        let published = broker.get_published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "a/b");
        assert_eq!(published[0].payload, Some(Bytes::from_static(b"hi")));
        assert!(published[0].retain);
        assert_eq!(published[0].qos, QoS::AtLeastOnce);
    }

    #[tokio::test]
    async fn test_rejects_invalid_input() {
        let broker = MockBroker::new();
        assert!(run(&broker, "", "x", false, 1).await.is_err());
        assert!(run(&broker, "a/#", "x", false, 1).await.is_err());
        assert!(run(&broker, "a", "x", false, 3).await.is_err());
        assert!(broker.get_published().await.is_empty());
    }

    #[tokio::test]
    async fn test_qos_selection() {
        let broker = MockBroker::new();
        run(&broker, "t", "x", false, 0).await.unwrap();
        run(&broker, "t", "x", false, 2).await.unwrap();

        let levels: Vec<QoS> = broker.get_published().await.iter().map(|m| m.qos).collect();
        assert_eq!(levels, vec![QoS::AtMostOnce, QoS::ExactlyOnce]);
    }
}
