use moist_protocol::{Calibration, Measurement, Packet};
use serde::{Deserialize, Serialize};

/// Append-only packet log for one device, with O(1) access to the latest
/// packet of each kind. Created lazily by the registry on the first packet
/// from a previously unseen device and never deleted afterwards; the
/// registry is the only writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceHistory {
    entries: Vec<Packet>,
    last_measurement: Option<usize>,
    last_calibration: Option<usize>,
}

impl DeviceHistory {
    pub(crate) fn append(&mut self, packet: Packet) {
        let idx = self.entries.len();
        match &packet {
            Packet::Measurement(_) => self.last_measurement = Some(idx),
            Packet::Calibration(_) => self.last_calibration = Some(idx),
            // The registry filters decode errors out before they get here.
            Packet::DecodeError { .. } => return,
        }
        self.entries.push(packet);
    }

    pub fn entries(&self) -> &[Packet] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest_measurement(&self) -> Option<&Measurement> {
        self.last_measurement
            .and_then(|i| match self.entries.get(i) {
                Some(Packet::Measurement(m)) => Some(m),
                _ => None,
            })
    }

    pub fn latest_calibration(&self) -> Option<&Calibration> {
        self.last_calibration
            .and_then(|i| match self.entries.get(i) {
                Some(Packet::Calibration(c)) => Some(c),
                _ => None,
            })
    }

    /// Measurements of the current calibration epoch: everything that
    /// arrived at or after the latest calibration, in arrival order. Empty
    /// when the device has no calibration (or no measurement) on record.
    pub fn measurements_since_last_calibration(&self) -> Vec<Measurement> {
        let since = match self.latest_calibration() {
            Some(c) => c.received_at,
            None => return Vec::new(),
        };
        self.entries
            .iter()
            .filter_map(|p| match p {
                Packet::Measurement(m) if m.received_at >= since => Some(m.clone()),
                _ => None,
            })
            .collect()
    }
}
