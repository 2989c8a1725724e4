use moist_protocol::{decode, Packet};
use moist_registry::DeviceRegistry;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// The registry behind its explicit read-write lock. Exactly one ingestion
/// path writes; query collaborators (bot, renderer) take read locks
/// concurrently with each other.
pub type SharedRegistry = Arc<RwLock<DeviceRegistry>>;

/// The single ingestion entry point consumed by the serial-reading
/// collaborator: decode, record, enqueue for fan-out, return the packet.
pub struct Ingestor {
    registry: SharedRegistry,
    fanout_tx: mpsc::Sender<Packet>,
}

impl Ingestor {
    pub fn new(registry: SharedRegistry, fanout_tx: mpsc::Sender<Packet>) -> Self {
        Self {
            registry,
            fanout_tx,
        }
    }

    /// Decode one raw line and fold it into the registry. Total: decode
    /// errors come back as a packet value like everything else (and are
    /// recorded nowhere).
    ///
    /// The packet is handed to the fan-out queue with a non-blocking send;
    /// a saturated queue loses the notification, never the registry entry,
    /// and never delays the caller's next line.
    pub fn ingest(&self, line: &str) -> Packet {
        let packet = decode(line);
        match self.registry.write() {
            Ok(mut registry) => {
                registry.record_packet(&packet);
            }
            Err(_) => error!("registry lock poisoned, packet not recorded"),
        }
        if let Err(e) = self.fanout_tx.try_send(packet.clone()) {
            warn!(error = %e, "fan-out queue rejected packet");
        }
        packet
    }

    /// Handle for reader collaborators.
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }
}
