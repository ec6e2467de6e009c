//! `clear <filter>`: subscribe and clear every retained value the broker reports

use super::StopSignal;
use crate::error::{CliError, CliResult};
use crate::transport::mqtt::{Delivery, MessageHandler};
use crate::transport::Broker;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run<B: Broker>(
    broker: &B,
    deliveries: &mut mpsc::UnboundedReceiver<Delivery>,
    mut stop: StopSignal,
    filter: &str,
) -> CliResult<u64> {
    broker
        .subscribe(filter, true)
        .await
        .map_err(CliError::transport)?;
    info!("Clearing retained messages under {}", filter);

    let mut cleared = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = stop.stopped() => break,
            next = deliveries.recv() => match next {
                Some(delivery) if MessageHandler::should_clear(&delivery) => {
                    match broker.clear_retained(&delivery.topic).await {
                        Ok(()) => {
                            info!("Cleared {}", delivery.topic);
                            cleared += 1;
                        }
                        Err(e) => warn!("Failed to clear {}: {}", delivery.topic, e),
                    }
                }
                Some(_) => {}
                None => break,
            }
        }
    }

    Ok(cleared)
}
