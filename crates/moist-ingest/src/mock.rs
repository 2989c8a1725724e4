use crate::sink::{PacketSink, SinkError};
use async_trait::async_trait;
use moist_protocol::Packet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// In-memory sink for tests and portable demo runs: records every
/// delivered packet and can be told to fail its first N attempts.
pub struct MockSink {
    name: &'static str,
    delivered: Mutex<Vec<Packet>>,
    attempts: AtomicU32,
    failures_left: AtomicU32,
}

impl MockSink {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            delivered: Mutex::new(Vec::new()),
            attempts: AtomicU32::new(0),
            failures_left: AtomicU32::new(0),
        }
    }

    /// Fail the first `n` delivery attempts with a transient error.
    pub fn failing_first(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn delivered(&self) -> Vec<Packet> {
        match self.delivered.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PacketSink for MockSink {
    fn name(&self) -> &str {
        self.name
    }

    async fn deliver(&self, packet: &Packet) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failures = self.failures_left.load(Ordering::SeqCst);
        if failures > 0 {
            // Saturates at u32::MAX for "always failing" sinks.
            if failures != u32::MAX {
                self.failures_left.store(failures - 1, Ordering::SeqCst);
            }
            return Err(SinkError::Send(format!("{name} mock failure", name = self.name)));
        }
        if let Ok(mut guard) = self.delivered.lock() {
            guard.push(packet.clone());
        }
        Ok(())
    }
}
