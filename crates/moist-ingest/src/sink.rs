use async_trait::async_trait;
use moist_protocol::Packet;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("send failed: {0}")]
    Send(String),
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// A notified collaborator at the fan-out boundary (chat broadcast, MQTT
/// publish, ...). Receives every packet after the registry has recorded it;
/// delivery may block on I/O and is retried by the dispatcher, but a
/// failing sink only ever costs its own packets.
#[async_trait]
pub trait PacketSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, packet: &Packet) -> Result<(), SinkError>;
}

/// Bounded per-recipient retry: fixed attempt count, fixed inter-attempt
/// delay. There is no further timeout or cancellation model.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Renders each packet as one JSON line on the log. Stands in for the
/// out-of-process bridge collaborators in deployments that run without
/// them.
pub struct JsonLogSink;

#[async_trait]
impl PacketSink for JsonLogSink {
    fn name(&self) -> &str {
        "json-log"
    }

    async fn deliver(&self, packet: &Packet) -> Result<(), SinkError> {
        let payload =
            serde_json::to_string(packet).map_err(|e| SinkError::Send(e.to_string()))?;
        info!(target: "moist_ingest::sink", %payload, "packet");
        Ok(())
    }
}
