//! JSON-lines bridge to an external pub/sub client.
//!
//! Inbound and outbound messages travel as one envelope per line:
//!
//! ```text
//! {"topic": "station/N2/neighbors", "payload": {"from": "N2", "data": [...]}}
//! ```
//!
//! Any broker client that can print subscriptions and publish lines can be
//! piped in front of and behind the master.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::coordinator::MasterCoordinator;
use crate::error::Result;
use crate::messages::OutboundMessage;

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    topic: String,
    payload: Value,
}

/// Counters for one inbound stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub accepted: usize,
    pub dropped: usize,
}

/// Feed every line of `reader` to the coordinator until end of input.
pub async fn pump_inbound<R>(reader: R, coordinator: Arc<MasterCoordinator>) -> Result<PumpStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = PumpStats::default();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let envelope: InboundEnvelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable inbound line");
                stats.dropped += 1;
                continue;
            }
        };
        let payload = serde_json::to_vec(&envelope.payload)?;
        match coordinator.handle_message(&envelope.topic, &payload).await {
            Ok(()) => stats.accepted += 1,
            Err(_) => stats.dropped += 1,
        }
    }

    info!(accepted = stats.accepted, dropped = stats.dropped, "Inbound stream closed");
    Ok(stats)
}

/// Write every outbound message to `writer` until the channel closes.
pub async fn drain_outbound<W>(mut rx: mpsc::UnboundedReceiver<OutboundMessage>, mut writer: W) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
        debug!(topic = %message.topic, "Outbound message written");
        written += 1;
    }
    Ok(written)
}
