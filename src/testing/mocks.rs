//! Mock implementations for testing
//!
//! [`MockBroker`] records every subscribe and publish it receives, with the time
//! each call arrived, so tests can assert on ordering and pacing.

use crate::transport::Broker;
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::QoS;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
#[error("Mock broker failure: {0}")]
pub struct MockBrokerError(pub String);

/// A publish recorded by [`MockBroker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Option<Bytes>,
    pub retain: bool,
    pub qos: QoS,
    pub at: Instant,
}

impl PublishedMessage {
    /// The (topic, payload, retain) triple that defines what a replay did
    pub fn key(&self) -> (String, Option<Bytes>, bool) {
        (self.topic.clone(), self.payload.clone(), self.retain)
    }
}

/// Mock broker for testing
#[derive(Debug, Default, Clone)]
pub struct MockBroker {
    pub published: Arc<Mutex<Vec<PublishedMessage>>>,
    pub subscriptions: Arc<Mutex<Vec<(String, bool)>>>,
    pub attempts: Arc<Mutex<usize>>,
    pub should_fail: bool,
    /// Topics whose publishes fail even when `should_fail` is off
    pub failing_topics: Vec<String>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn failing_on(topics: &[&str]) -> Self {
        Self {
            failing_topics: topics.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub async fn get_published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    pub async fn get_subscriptions(&self) -> Vec<(String, bool)> {
        self.subscriptions.lock().await.clone()
    }

    /// Every publish call, failed ones included
    pub async fn publish_attempts(&self) -> usize {
        *self.attempts.lock().await
    }
}

#[async_trait]
impl Broker for MockBroker {
    type Error = MockBrokerError;

    async fn subscribe(&self, filter: &str, retain_as_published: bool) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(MockBrokerError("subscribe".to_string()));
        }
        self.subscriptions
            .lock()
            .await
            .push((filter.to_string(), retain_as_published));
        Ok(())
    }

    async fn publish_with_qos(
        &self,
        topic: &str,
        payload: Option<Bytes>,
        retain: bool,
        qos: QoS,
    ) -> Result<(), Self::Error> {
        *self.attempts.lock().await += 1;
        if self.should_fail || self.failing_topics.iter().any(|t| t == topic) {
            return Err(MockBrokerError(format!("publish to {topic}")));
        }

        self.published.lock().await.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            retain,
            qos,
            at: Instant::now(),
        });
        Ok(())
    }
}
