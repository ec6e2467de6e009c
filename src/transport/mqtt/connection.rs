//! Pure connection state management for the MQTT session
//!
//! This module contains pure functions that turn a resolved
//! [`ConnectionConfig`](crate::auth::ConnectionConfig) into `rumqttc` options for
//! either protocol revision, plus the connection state and error types.

use crate::auth::{ConnectionConfig, TlsSetting};
use rumqttc::{TlsConfiguration, Transport as RumqttcTransport};
use std::time::Duration;
use thiserror::Error;

/// Connection state of the session supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - first attempt in flight
    Connecting,
    /// ConnAck received
    Connected,
    /// Transport closed; the next attempt starts after `delay`
    Reconnecting { delay: Duration },
    /// Session shut down by the client
    Disconnected(String),
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing to '{topic}' failed")]
    PublishFailed {
        topic: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Subscription to '{filter}' failed")]
    SubscriptionFailed {
        filter: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Session closed before the broker acknowledged the connection")]
    ClosedBeforeReady,
    #[error("Delivery stream already taken by another consumer")]
    DeliveriesTaken,
}

/// Client identifier: the resolved one, else a random one per process
pub fn resolve_client_id(config: &ConnectionConfig) -> String {
    config.client_id.clone().unwrap_or_else(|| {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("mqtt-cli-{}", &id[..12])
    })
}

/// Map the TLS setting onto a `rumqttc` transport
pub fn configure_transport(tls: &TlsSetting) -> RumqttcTransport {
    match tls {
        TlsSetting::Disabled => RumqttcTransport::tcp(),
        TlsSetting::DefaultRoots => RumqttcTransport::tls_with_default_config(),
        TlsSetting::ClientCertificate(bundle) => {
            RumqttcTransport::tls_with_config(TlsConfiguration::Simple {
                ca: bundle.ca.clone(),
                alpn: None,
                client_auth: Some((bundle.cert.clone(), bundle.key.clone())),
            })
        }
    }
}

/// MQTT 5 options: used by every mode except capability
pub fn configure_v5_options(config: &ConnectionConfig) -> rumqttc::v5::MqttOptions {
    let mut options = rumqttc::v5::MqttOptions::new(
        resolve_client_id(config),
        config.host.clone(),
        config.port,
    );
    options.set_transport(configure_transport(&config.tls));
    options.set_keep_alive(config.keep_alive);
    if let Some(username) = &config.username {
        options.set_credentials(
            username.clone(),
            config.password.clone().unwrap_or_default(),
        );
    }
    options
}

/// MQTT 3.1.1 options: the capability-mode broker has no protocol-version pin
pub fn configure_v4_options(config: &ConnectionConfig) -> rumqttc::MqttOptions {
    let mut options =
        rumqttc::MqttOptions::new(resolve_client_id(config), config.host.clone(), config.port);
    options.set_transport(configure_transport(&config.tls));
    options.set_keep_alive(config.keep_alive);
    if let Some(username) = &config.username {
        options.set_credentials(
            username.clone(),
            config.password.clone().unwrap_or_default(),
        );
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthMode, ProtocolVersion};
    use crate::transport::mqtt::BackoffPolicy;

    fn test_connection_config() -> ConnectionConfig {
        ConnectionConfig {
            mode: AuthMode::ExplicitUrl,
            host: "localhost".to_string(),
            port: 1883,
            tls: TlsSetting::Disabled,
            username: None,
            password: None,
            client_id: None,
            protocol: ProtocolVersion::V5,
            keep_alive: Duration::from_secs(60),
            backoff: BackoffPolicy::default(),
        }
    }

    #[test]
    fn test_resolved_client_id_is_kept() {
        let mut config = test_connection_config();
        config.client_id = Some("pkg/1.2.3".to_string());
        assert_eq!(resolve_client_id(&config), "pkg/1.2.3");
    }

    #[test]
    fn test_generated_client_ids_are_unique() {
        let config = test_connection_config();
        let first = resolve_client_id(&config);
        let second = resolve_client_id(&config);
        assert!(first.starts_with("mqtt-cli-"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_v5_options_carry_endpoint_and_credentials() {
        let mut config = test_connection_config();
        config.username = Some(r#"{"id":"d1"}"#.to_string());
        config.password = Some("token".to_string());
        config.client_id = Some("client-a".to_string());

        let options = configure_v5_options(&config);
        assert_eq!(
            options.broker_address(),
            ("localhost".to_string(), 1883)
        );
        assert_eq!(options.client_id(), "client-a");
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
    }

    #[test]
    fn test_v4_options_carry_endpoint() {
        let mut config = test_connection_config();
        config.port = 1999;
        let options = configure_v4_options(&config);
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1999));
    }

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_ne!(
            ConnectionState::Connected,
            ConnectionState::Reconnecting {
                delay: Duration::from_millis(2000)
            }
        );
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::ConnectionFailed("test".to_string().into()),
            MqttError::PublishFailed {
                topic: "a/b".to_string(),
                source: "test".to_string().into(),
            },
            MqttError::SubscriptionFailed {
                filter: "a/#".to_string(),
                source: "test".to_string().into(),
            },
            MqttError::ClosedBeforeReady,
            MqttError::DeliveriesTaken,
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
