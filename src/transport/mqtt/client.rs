//! Impure I/O for the MQTT session
//!
//! [`Session`] owns the `rumqttc` client for either protocol revision and a
//! supervisor task that drives the event loop, applies the reconnect backoff,
//! re-subscribes after reconnects and forwards deliveries to a single consumer.

use super::backoff::ReconnectController;
use super::connection::{configure_v4_options, configure_v5_options, ConnectionState, MqttError};
use super::message_handler::{Delivery, EventRoute, MessageHandler};
use crate::auth::{ConnectionConfig, ProtocolVersion};
use crate::config::SessionSection;
use crate::transport::Broker;
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::QoS;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Grace period for the supervisor to flush queued requests on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A tracked subscription, re-issued after every reconnect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub filter: String,
    pub retain_as_published: bool,
}

/// `rumqttc` client for the negotiated protocol revision
#[derive(Clone)]
enum BrokerClient {
    V5(rumqttc::v5::AsyncClient),
    V4(rumqttc::AsyncClient),
}

impl BrokerClient {
    async fn subscribe(&self, subscription: &Subscription) -> Result<(), MqttError> {
        let result = match self {
            BrokerClient::V5(client) => {
                let mut filter = rumqttc::v5::mqttbytes::v5::Filter::new(
                    subscription.filter.clone(),
                    rumqttc::v5::mqttbytes::QoS::AtLeastOnce,
                );
                filter.preserve_retain = subscription.retain_as_published;
                client
                    .subscribe_many(vec![filter])
                    .await
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            }
            BrokerClient::V4(client) => {
                if subscription.retain_as_published {
                    debug!("MQTT 3.1.1 has no retain-as-published option, relying on broker defaults");
                }
                client
                    .subscribe(subscription.filter.clone(), QoS::AtLeastOnce)
                    .await
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            }
        };

        result.map_err(|source| MqttError::SubscriptionFailed {
            filter: subscription.filter.clone(),
            source,
        })
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: QoS,
    ) -> Result<(), MqttError> {
        let result = match self {
            BrokerClient::V5(client) => client
                .publish(topic.to_string(), to_v5_qos(qos), retain, payload)
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
            BrokerClient::V4(client) => client
                .publish(topic.to_string(), qos, retain, payload)
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        };

        result.map_err(|source| MqttError::PublishFailed {
            topic: topic.to_string(),
            source,
        })
    }

    async fn disconnect(&self) -> Result<(), MqttError> {
        match self {
            BrokerClient::V5(client) => client
                .disconnect()
                .await
                .map_err(|e| MqttError::ConnectionFailed(Box::new(e))),
            BrokerClient::V4(client) => client
                .disconnect()
                .await
                .map_err(|e| MqttError::ConnectionFailed(Box::new(e))),
        }
    }
}

/// Event loop for the negotiated protocol revision
enum BrokerEventLoop {
    V5(Box<rumqttc::v5::EventLoop>),
    V4(Box<rumqttc::EventLoop>),
}

impl BrokerEventLoop {
    async fn poll(&mut self) -> Result<EventRoute, String> {
        match self {
            BrokerEventLoop::V5(event_loop) => event_loop
                .poll()
                .await
                .map(|event| MessageHandler::route_v5_event(&event))
                .map_err(|e| e.to_string()),
            BrokerEventLoop::V4(event_loop) => event_loop
                .poll()
                .await
                .map(|event| MessageHandler::route_v4_event(&event))
                .map_err(|e| e.to_string()),
        }
    }
}

fn to_v5_qos(qos: QoS) -> rumqttc::v5::mqttbytes::QoS {
    use rumqttc::v5::mqttbytes::QoS as V5QoS;
    match qos {
        QoS::AtMostOnce => V5QoS::AtMostOnce,
        QoS::AtLeastOnce => V5QoS::AtLeastOnce,
        QoS::ExactlyOnce => V5QoS::ExactlyOnce,
    }
}

/// Everything the supervisor task owns
struct Supervisor {
    event_loop: BrokerEventLoop,
    client: BrokerClient,
    reconnect: ReconnectController,
    state_tx: watch::Sender<ConnectionState>,
    ready_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    deliveries_tx: mpsc::UnboundedSender<Delivery>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl Supervisor {
    async fn run(mut self) {
        let mut closing = false;
        // First attempt goes out without delay
        let _ = self.reconnect.pre_connect();

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed(), if !closing => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        debug!("Shutdown requested, draining queued requests");
                        closing = true;
                    }
                }

                result = self.event_loop.poll() => match result {
                    Ok(route) => self.handle_route(route),
                    Err(e) => {
                        if closing {
                            debug!("Event loop closed during shutdown: {}", e);
                            break;
                        }
                        warn!("MQTT event loop error: {}", e);
                        let delay = self.reconnect.on_close();
                        let _ = self.state_tx.send(ConnectionState::Reconnecting { delay });

                        let wait = self.reconnect.pre_connect();
                        if !interruptible_sleep(self.shutdown_rx.clone(), wait).await {
                            break;
                        }
                    }
                }
            }
        }

        let _ = self
            .state_tx
            .send(ConnectionState::Disconnected("Client disconnected".to_string()));
        info!("MQTT event loop stopped");
    }

    fn handle_route(&mut self, route: EventRoute) {
        match route {
            EventRoute::ConnectionAcknowledged => {
                self.reconnect.on_connect();
                let _ = self.state_tx.send(ConnectionState::Connected);

                if *self.ready_tx.borrow() {
                    spawn_resubscribe(self.client.clone(), self.subscriptions.clone());
                } else {
                    info!("MQTT session ready");
                    let _ = self.ready_tx.send(true);
                }
            }
            EventRoute::MessageReceived(delivery) => {
                debug!(
                    target: "mqtt_transport",
                    topic = %delivery.topic,
                    retain = delivery.retain,
                    bytes = delivery.payload.len(),
                    "Received MQTT message"
                );
                // Never blocks: the consumer may itself be waiting on the request queue
                let _ = self.deliveries_tx.send(delivery);
            }
            EventRoute::Disconnected => {
                warn!("MQTT broker sent DISCONNECT");
            }
            EventRoute::SubscriptionConfirmed { packet_id, codes } => {
                debug!(target: "mqtt_transport", "Subscription {} confirmed: {}", packet_id, codes);
            }
            EventRoute::InfrastructureEvent(event) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event);
            }
            EventRoute::OutgoingEvent => {}
        }
    }

}

/// Re-issue every tracked subscription from its own task. The supervisor is the
/// only reader of the request queue, so it must keep polling while these wait for
/// room behind queued publishes.
fn spawn_resubscribe(
    client: BrokerClient,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
) {
    tokio::spawn(async move {
        let subscriptions = subscriptions.lock().await.clone();
        for subscription in &subscriptions {
            match client.subscribe(subscription).await {
                Ok(()) => debug!("Re-subscribed to: {}", subscription.filter),
                Err(e) => error!("Failed to re-subscribe to {}: {}", subscription.filter, e),
            }
        }
    });
}

/// Sleep that ends early on shutdown. Returns false if shutdown was requested.
async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay: Duration) -> bool {
    if *shutdown_rx.borrow() {
        return false;
    }
    if delay.is_zero() {
        return true;
    }
    tokio::select! {
        changed = shutdown_rx.changed() => {
            if changed.is_err() || *shutdown_rx.borrow() {
                info!("Shutdown signal received during reconnect delay");
                return false;
            }
            true
        }
        _ = tokio::time::sleep(delay) => true,
    }
}

/// The live broker connection shared by every command of this process
pub struct Session {
    client: BrokerClient,
    state_rx: watch::Receiver<ConnectionState>,
    ready_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
    deliveries: Option<mpsc::UnboundedReceiver<Delivery>>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    supervisor: Option<JoinHandle<()>>,
}

impl Session {
    /// Start connecting in the background. Use [`Session::ready`] to wait for the
    /// first ConnAck. Must be called from within a tokio runtime.
    pub fn connect(config: &ConnectionConfig, settings: &SessionSection) -> Self {
        let capacity = settings.channel_capacity.max(1);
        let (client, event_loop) = match config.protocol {
            ProtocolVersion::V5 => {
                let (client, event_loop) =
                    rumqttc::v5::AsyncClient::new(configure_v5_options(config), capacity);
                (
                    BrokerClient::V5(client),
                    BrokerEventLoop::V5(Box::new(event_loop)),
                )
            }
            ProtocolVersion::V311 => {
                let (client, event_loop) =
                    rumqttc::AsyncClient::new(configure_v4_options(config), capacity);
                (
                    BrokerClient::V4(client),
                    BrokerEventLoop::V4(Box::new(event_loop)),
                )
            }
        };

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (ready_tx, ready_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(Mutex::new(Vec::new()));

        info!(
            broker = %config.broker_url(),
            mode = ?config.mode,
            "Starting MQTT session"
        );

        let supervisor = Supervisor {
            event_loop,
            client: client.clone(),
            reconnect: ReconnectController::new(config.backoff),
            state_tx,
            ready_tx,
            shutdown_rx,
            deliveries_tx,
            subscriptions: subscriptions.clone(),
        };
        let handle = tokio::spawn(supervisor.run());

        Self {
            client,
            state_rx,
            ready_rx,
            shutdown_tx,
            deliveries: Some(deliveries_rx),
            subscriptions,
            supervisor: Some(handle),
        }
    }

    /// Resolves on the first ConnAck of the session. Later reconnects never
    /// re-trigger it.
    pub async fn ready(&self) -> Result<(), MqttError> {
        let mut ready_rx = self.ready_rx.clone();
        ready_rx
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| MqttError::ClosedBeforeReady)
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Hand out the delivery stream. There is exactly one consumer per session.
    pub fn take_deliveries(&mut self) -> Result<mpsc::UnboundedReceiver<Delivery>, MqttError> {
        self.deliveries.take().ok_or(MqttError::DeliveriesTaken)
    }

    /// Queue a DISCONNECT behind pending requests and wait for the supervisor to
    /// drain them
    pub async fn shutdown(&mut self) -> Result<(), MqttError> {
        if let Err(e) = self.client.disconnect().await {
            warn!("Failed to queue DISCONNECT: {}", e);
        }
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.supervisor.take() {
            let abort = handle.abort_handle();
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => debug!("Event loop task shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Event loop task ended with error: {}", e)
                }
                Err(_) => {
                    warn!("Event loop task didn't shut down in time, aborting");
                    abort.abort();
                }
                _ => {}
            }
        }

        info!("MQTT session closed");
        Ok(())
    }
}

#[async_trait]
impl Broker for Session {
    type Error = MqttError;

    async fn subscribe(&self, filter: &str, retain_as_published: bool) -> Result<(), MqttError> {
        let subscription = Subscription {
            filter: filter.to_string(),
            retain_as_published,
        };

        info!("Subscribing to: {}", filter);
        self.client.subscribe(&subscription).await?;

        let mut subscriptions = self.subscriptions.lock().await;
        if !subscriptions.contains(&subscription) {
            subscriptions.push(subscription);
        }
        Ok(())
    }

    async fn publish_with_qos(
        &self,
        topic: &str,
        payload: Option<Bytes>,
        retain: bool,
        qos: QoS,
    ) -> Result<(), MqttError> {
        let payload = payload.map(|p| p.to_vec()).unwrap_or_default();
        info!(
            topic = %topic,
            retain = retain,
            bytes = payload.len(),
            "Publishing"
        );
        self.client.publish(topic, payload, retain, qos).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
    }
}
