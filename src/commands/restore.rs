//! `restore [file]`: replay a backup in file order
//!
//! Publishes are handed to the client without waiting for acknowledgement, so
//! replay is paced by read speed only. Malformed lines are logged and skipped.

use crate::error::CliResult;
use crate::record::decode;
use crate::transport::Broker;
use bytes::Bytes;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Counts reported at the end of a restore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub published: usize,
    pub malformed: usize,
    pub failed: usize,
}

/// Replay every record read from `lines`
pub async fn replay<B, R>(broker: &B, lines: R) -> CliResult<RestoreSummary>
where
    B: Broker,
    R: AsyncBufRead + Unpin,
{
    let mut summary = RestoreSummary::default();
    let mut segments = lines.split(b'\n');
    let mut line_number = 0usize;

    while let Some(segment) = segments.next_segment().await? {
        line_number += 1;
        let line = String::from_utf8_lossy(&segment);
        if line.trim().is_empty() {
            debug!("Skipping blank line {}", line_number);
            continue;
        }

        let record = match decode(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping line {}: {}", line_number, e);
                summary.malformed += 1;
                continue;
            }
        };

        let payload = Bytes::from(record.payload);
        match broker.publish(&record.topic, Some(payload), record.retain).await {
            Ok(()) => {
                info!("Restored {}", record.topic);
                summary.published += 1;
            }
            Err(e) => {
                warn!("Failed to restore {} (line {}): {}", record.topic, line_number, e);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Restore from `source`, or from stdin when no file is given
pub async fn run<B: Broker>(broker: &B, source: Option<&Path>) -> CliResult<RestoreSummary> {
    let summary = match source {
        Some(path) => {
            info!("Restoring from {}", path.display());
            let file = tokio::fs::File::open(path).await?;
            replay(broker, BufReader::new(file)).await?
        }
        None => {
            info!("Restoring from stdin");
            replay(broker, BufReader::new(tokio::io::stdin())).await?
        }
    };

    info!(
        published = summary.published,
        malformed = summary.malformed,
        failed = summary.failed,
        "Restore finished"
    );
    Ok(summary)
}
