use crate::sink::{PacketSink, RetryPolicy};
use moist_protocol::Packet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Dispatcher between the ingestion path and the notified collaborators.
///
/// Packets enter through the returned queue sender; for each packet one
/// delivery task runs per sink concurrently, each with its own bounded
/// retry. The dispatcher waits for every sink to settle before dequeuing
/// the next packet — the broadcast is complete-or-logged as a whole — while
/// the queue in front keeps ingestion decoupled from all of it.
pub struct FanOut;

impl FanOut {
    pub fn spawn(
        sinks: Vec<Arc<dyn PacketSink>>,
        policy: RetryPolicy,
        capacity: usize,
    ) -> (mpsc::Sender<Packet>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Packet>(capacity);
        let handle = tokio::spawn(async move {
            while let Some(packet) = rx.recv().await {
                let mut deliveries = Vec::with_capacity(sinks.len());
                for sink in &sinks {
                    let sink = Arc::clone(sink);
                    let packet = packet.clone();
                    deliveries.push(tokio::spawn(deliver_with_retry(sink, packet, policy)));
                }
                for delivery in deliveries {
                    if delivery.await.is_err() {
                        error!("fan-out delivery task panicked");
                    }
                }
            }
            debug!("fan-out queue closed, dispatcher exiting");
        });
        (tx, handle)
    }
}

async fn deliver_with_retry(sink: Arc<dyn PacketSink>, packet: Packet, policy: RetryPolicy) {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match sink.deliver(&packet).await {
            Ok(()) => {
                if attempt > 1 {
                    debug!(sink = sink.name(), attempt, "delivery succeeded after retry");
                }
                return;
            }
            Err(e) => {
                warn!(sink = sink.name(), attempt, error = %e, "delivery failed");
                if attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }
    // Partial success is acceptable at this boundary; the packet is already
    // recorded in the registry.
    error!(
        sink = sink.name(),
        attempts, "dropping packet after exhausting retries"
    );
}
