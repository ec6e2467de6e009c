//! Throttled bulk clear of retained topics
//!
//! Each input line names one exact topic (no wildcard expansion). Topics are
//! cleared in input order with a fixed pause between publishes, so a long list
//! never floods the client's outgoing queue.

use crate::transport::Broker;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// Default pause between two clears
pub const DEFAULT_PURGE_DELAY: Duration = Duration::from_millis(50);

/// Outcome of one purge run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Clears handed to the broker client
    pub cleared: usize,
    /// Clears the broker client refused
    pub failed: usize,
    /// Blank or non-UTF-8 lines
    pub skipped: usize,
}

impl PurgeReport {
    pub fn attempted(&self) -> usize {
        self.cleared + self.failed
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PurgeThrottler {
    delay: Duration,
}

impl PurgeThrottler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Clear every topic read from `lines`. Failures are counted and logged, never
    /// retried; the loop is paced by the delay alone.
    pub async fn drain<B, R>(&self, broker: &B, lines: R) -> std::io::Result<PurgeReport>
    where
        B: Broker,
        R: AsyncBufRead + Unpin,
    {
        let mut report = PurgeReport::default();
        let mut segments = lines.split(b'\n');
        let mut line_number = 0usize;

        while let Some(segment) = segments.next_segment().await? {
            line_number += 1;
            let Ok(line) = String::from_utf8(segment) else {
                warn!("Skipping line {}: not valid UTF-8", line_number);
                report.skipped += 1;
                continue;
            };

            let topic = line.trim();
            if topic.is_empty() {
                debug!("Skipping blank line {}", line_number);
                report.skipped += 1;
                continue;
            }

            if report.attempted() > 0 {
                tokio::time::sleep(self.delay).await;
            }

            match broker.clear_retained(topic).await {
                Ok(()) => {
                    info!("Cleared retained message on {}", topic);
                    report.cleared += 1;
                }
                Err(e) => {
                    warn!("Failed to clear {}: {}", topic, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

impl Default for PurgeThrottler {
    fn default() -> Self {
        Self::new(DEFAULT_PURGE_DELAY)
    }
}
