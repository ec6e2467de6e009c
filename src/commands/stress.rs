//! `stress [--rate N]`: publish timestamps at a fixed rate until stopped
//!
//! There is no backpressure: a rate above what the connection sustains makes
//! publishes queue up in the client.

use super::StopSignal;
use crate::error::{CliError, CliResult};
use crate::transport::Broker;
use bytes::Bytes;
use std::time::Duration;
use tracing::{info, warn};

/// Process-unique topic for this run
pub fn default_topic() -> String {
    format!("stress/{}", std::process::id())
}

/// Interval between publishes for a rate in publications per second
pub fn publish_interval(rate: u32) -> CliResult<Duration> {
    if rate == 0 {
        return Err(CliError::invalid_input("rate must be at least 1"));
    }
    Ok(Duration::from_secs(1) / rate)
}

pub async fn run<B: Broker>(
    broker: &B,
    mut stop: StopSignal,
    topic: &str,
    rate: u32,
) -> CliResult<u64> {
    let mut interval = tokio::time::interval(publish_interval(rate)?);
    info!("Publishing to {} at {} msg/s", topic, rate);

    let mut last = i64::MIN;
    let mut sent = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = stop.stopped() => break,
            _ = interval.tick() => {
                // Wall-clock steps backwards must not show up in the payload
                last = last.max(chrono::Utc::now().timestamp_millis());
                let payload = Bytes::from(last.to_string());
                match broker.publish(topic, Some(payload), false).await {
                    Ok(()) => sent += 1,
                    Err(e) => warn!("Stress publish failed: {}", e),
                }
            }
        }
    }

    info!("Stress run published {} messages", sent);
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBroker;

    #[test]
    fn test_interval_from_rate() {
        assert_eq!(publish_interval(1).unwrap(), Duration::from_secs(1));
        assert_eq!(publish_interval(100).unwrap(), Duration::from_millis(10));
        assert!(publish_interval(0).is_err());
    }

    #[test]
    fn test_topic_is_process_scoped() {
        assert_eq!(default_topic(), format!("stress/{}", std::process::id()));
    }

    #[tokio::test]
    async fn test_payloads_never_decrease() {
        let broker = MockBroker::new();
        let (stop_tx, stop) = StopSignal::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = stop_tx.send(true);
        });

        let sent = run(&broker, stop, "stress/test", 200).await.unwrap();
        assert!(sent > 1);

        let published = broker.get_published().await;
        let stamps: Vec<i64> = published
            .iter()
            .map(|m| {
                let payload = m.payload.as_ref().unwrap();
                std::str::from_utf8(payload).unwrap().parse().unwrap()
            })
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert!(published.iter().all(|m| !m.retain && m.topic == "stress/test"));
    }
}
