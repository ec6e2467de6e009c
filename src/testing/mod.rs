//! Testing utilities and mock implementations
//!
//! Commands and the purge throttler are generic over [`Broker`](crate::transport::Broker),
//! so they can be exercised here without a running MQTT broker.

pub mod mocks;

pub use mocks::*;
