//! Reconnect backoff for the MQTT session
//!
//! The controller owns the only mutable reconnect state. The session supervisor
//! reports close and connect events to it and asks it, before every connection
//! attempt, how long to wait. It never gives up and never errors: repeated failures
//! show up only as logged close events.

use crate::config::ReconnectSection;
use std::time::Duration;
use tracing::{info, warn};

/// Bounds for the reconnect delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1000),
            max: Duration::from_millis(20_000),
        }
    }
}

impl From<&ReconnectSection> for BackoffPolicy {
    fn from(section: &ReconnectSection) -> Self {
        Self {
            initial: Duration::from_millis(section.initial_delay_ms),
            max: Duration::from_millis(section.max_delay_ms),
        }
    }
}

/// Exponential reconnect delay: doubled on every close, reset on every success
#[derive(Debug, Clone)]
pub struct ReconnectController {
    policy: BackoffPolicy,
    current: Duration,
    attempts: u64,
    closes_since_connect: u32,
}

impl ReconnectController {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: policy.initial,
            attempts: 0,
            closes_since_connect: 0,
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }

    /// Consecutive closes since the last successful connection
    pub fn closes_since_connect(&self) -> u32 {
        self.closes_since_connect
    }

    /// Transport closed or failed to connect: double the delay, capped at the maximum
    pub fn on_close(&mut self) -> Duration {
        self.closes_since_connect = self.closes_since_connect.saturating_add(1);
        self.current = self.current.saturating_mul(2).min(self.policy.max);
        warn!(
            delay_ms = self.current.as_millis() as u64,
            closes = self.closes_since_connect,
            "MQTT connection closed, reconnecting in {}ms",
            self.current.as_millis()
        );
        self.current
    }

    /// Connection established: back to the initial delay
    pub fn on_connect(&mut self) {
        if self.closes_since_connect > 0 {
            info!(
                "MQTT connection re-established after {} close(s)",
                self.closes_since_connect
            );
        }
        self.closes_since_connect = 0;
        self.current = self.policy.initial;
    }

    /// Hook run before every connection attempt, including the first. Returns how
    /// long to wait before the attempt; the first attempt goes out immediately.
    pub fn pre_connect(&mut self) -> Duration {
        self.attempts += 1;
        if self.attempts == 1 {
            Duration::ZERO
        } else {
            self.current
        }
    }
}

impl Default for ReconnectController {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
