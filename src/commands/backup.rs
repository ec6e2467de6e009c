//! `backup <filter> <file>`: append every retained value under a filter

use super::StopSignal;
use crate::error::{CliError, CliResult};
use crate::record::{BackupRecord, BackupWriter};
use crate::transport::mqtt::Delivery;
use crate::transport::Broker;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct BackupOptions {
    /// Also record deliveries that were not retained
    pub include_live: bool,
}

/// Each delivery is written and flushed before the next one is taken
pub async fn run<B: Broker>(
    broker: &B,
    deliveries: &mut mpsc::UnboundedReceiver<Delivery>,
    mut stop: StopSignal,
    filter: &str,
    writer: &mut BackupWriter,
    options: BackupOptions,
) -> CliResult<u64> {
    broker
        .subscribe(filter, true)
        .await
        .map_err(CliError::transport)?;
    info!("Backing up {} to {}", filter, writer.path().display());

    loop {
        tokio::select! {
            biased;
            _ = stop.stopped() => break,
            next = deliveries.recv() => match next {
                Some(delivery) => {
                    if delivery.is_retained_clear() {
                        debug!("Skipping cleared topic {}", delivery.topic);
                        continue;
                    }
                    if !delivery.retain && !options.include_live {
                        debug!("Skipping live message on {}", delivery.topic);
                        continue;
                    }
                    writer.append(&BackupRecord::from_delivery(&delivery)).await?;
                    info!("Backed up {}", delivery.topic);
                }
                None => break,
            }
        }
    }

    Ok(writer.records_written())
}
