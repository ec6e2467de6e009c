//! Command drivers
//!
//! Each command composes the session primitives: one subscription or a batch of
//! publishes. Subscription commands run until their [`StopSignal`] fires or the
//! delivery stream ends; one-shot commands return when their input is drained.

pub mod backup;
pub mod clear;
pub mod publish;
pub mod purge;
pub mod restore;
pub mod stress;
pub mod sub;

use tokio::sync::watch;

/// Cooperative stop for long-running commands (signal or batch timeout)
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// A sender/signal pair. Sending `true` (or dropping the sender) stops.
    pub fn channel() -> (watch::Sender<bool>, StopSignal) {
        let (tx, rx) = watch::channel(false);
        (tx, StopSignal { rx })
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop is requested
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
