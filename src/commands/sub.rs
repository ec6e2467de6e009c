//! `sub <filter>`: print every delivery

use super::StopSignal;
use crate::error::{CliError, CliResult};
use crate::transport::mqtt::Delivery;
use crate::transport::Broker;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::info;

/// Render one delivery for the terminal. JSON objects and arrays are
/// pretty-printed, everything else is shown as (lossy) text.
pub fn render_delivery(delivery: &Delivery) -> String {
    let marker = if delivery.retain { " [retained]" } else { "" };
    let body = match serde_json::from_slice::<Value>(&delivery.payload) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| String::from_utf8_lossy(&delivery.payload).into_owned()),
        _ => String::from_utf8_lossy(&delivery.payload).into_owned(),
    };
    format!("{}{}\n{}\n", delivery.topic, marker, body)
}

pub async fn run<B, W>(
    broker: &B,
    deliveries: &mut mpsc::UnboundedReceiver<Delivery>,
    mut stop: StopSignal,
    filter: &str,
    out: &mut W,
) -> CliResult<u64>
where
    B: Broker,
    W: AsyncWrite + Unpin,
{
    broker
        .subscribe(filter, true)
        .await
        .map_err(CliError::transport)?;
    info!("Subscribed to {}", filter);

    let mut printed = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = stop.stopped() => break,
            next = deliveries.recv() => match next {
                Some(delivery) => {
                    out.write_all(render_delivery(&delivery).as_bytes()).await?;
                    out.flush().await?;
                    printed += 1;
                }
                None => break,
            }
        }
    }

    Ok(printed)
}
