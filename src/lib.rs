//! MQTT command-line client
//!
//! A command-line client for an MQTT broker whose core is session management:
//! resolving one of several mutually exclusive authentication strategies,
//! keeping the connection alive with exponential reconnect backoff, and moving
//! retained message state to and from a line-oriented backup format.
//!
//! # Overview
//!
//! - [`auth`] - Credential strategy resolution (explicit URL, client certificate,
//!   JWT, local capability fallback)
//! - [`transport`] - The [`Broker`](transport::Broker) seam and the MQTT
//!   [`Session`](transport::mqtt::Session) with its reconnect supervisor
//! - [`record`] - Backup record codec and append-only writer
//! - [`purge`] - Throttled bulk clear of retained topics
//! - [`commands`] - sub / clear / purge / pub / backup / restore / stress
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_cli::record::{decode, encode, BackupRecord};
//!
//! let record = BackupRecord::new("a/b", b"hi".to_vec(), true);
//! let line = encode(&record).unwrap();
//! assert_eq!(decode(&line).unwrap(), record);
//! ```

pub mod app;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod observability;
pub mod purge;
pub mod record;
pub mod terminal;
pub mod testing;
pub mod transport;

pub use error::{CliError, CliResult};
