//! MQTT session for the command-line client
//!
//! This module separates pure functions from I/O operations so the reconnect
//! and routing logic can be tested without a broker.
//!
//! # Architecture
//!
//! - [`connection`] - Pure option building, connection state and errors
//! - [`message_handler`] - Pure event routing for both protocol revisions
//! - [`backoff`] - Reconnect delay bookkeeping
//! - [`client`] - Impure I/O: the [`Session`] and its supervisor task
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqtt_cli::auth::{AuthInputs, AuthResolver};
//! use mqtt_cli::config::CliConfig;
//! use mqtt_cli::transport::{mqtt::Session, Broker};
//!
//! # tokio_test::block_on(async {
//! let config = CliConfig::default();
//! let inputs = AuthInputs {
//!     broker_url: Some("mqtt://localhost:1883".to_string()),
//!     ..AuthInputs::default()
//! };
//! let connection = AuthResolver::new(&config).resolve(&inputs)?;
//!
//! let mut session = Session::connect(&connection, &config.session);
//! session.ready().await?;
//! session.publish("greetings", Some("hello".into()), false).await?;
//! session.shutdown().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod backoff;
pub mod client;
pub mod connection;
pub mod message_handler;

pub use backoff::{BackoffPolicy, ReconnectController};
pub use client::{Session, Subscription};
pub use connection::{ConnectionState, MqttError};
pub use message_handler::{Delivery, EventRoute, MessageHandler};
