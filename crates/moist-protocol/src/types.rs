use core::fmt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Integer node id of a physical sensor. The sole registry key: two
/// identities are equal iff the ids match.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct DeviceId(u32);

impl DeviceId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device#{id}", id = self.0)
    }
}

/// A type-1 frame: periodic moisture reading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub device: DeviceId,
    pub protocol_version: u32,
    /// Ingestion-clock arrival time, not the device's own counter.
    pub received_at: OffsetDateTime,
    /// Device-reported elapsed time, normalized to minutes.
    pub uptime_min: u32,
    /// Raw moisture reading.
    pub moisture: u32,
    /// Raw supply voltage; 0 when the node reported `?`.
    pub voltage: u32,
}

/// A type-2 frame: calibration update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    pub device: DeviceId,
    pub protocol_version: u32,
    pub received_at: OffsetDateTime,
    pub uptime_min: u32,
    pub voltage: u32,
    /// Raw reading against dry soil.
    pub dry: u32,
    /// Raw reading against wet soil.
    pub wet: u32,
    pub voltage_min: u32,
    pub voltage_max: u32,
    pub interval_idx: u32,
    pub interval: u32,
    /// Set when this is the first calibration since node boot.
    pub first_since_boot: bool,
}

/// Closed set of things a raw line can decode to. Consumers match
/// exhaustively; there is no fourth kind to fall through to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    Measurement(Measurement),
    Calibration(Calibration),
    /// The line did not carry a valid preamble (or an unknown type code).
    /// Keeps the offending input verbatim; there is no device identity to
    /// attach, so these are logged but never stored.
    DecodeError { line: String, reason: String },
}

impl Packet {
    /// Identity of the reporting node, if the frame decoded at all.
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            Packet::Measurement(m) => Some(m.device),
            Packet::Calibration(c) => Some(c.device),
            Packet::DecodeError { .. } => None,
        }
    }

    /// Arrival timestamp, absent for decode errors.
    pub fn received_at(&self) -> Option<OffsetDateTime> {
        match self {
            Packet::Measurement(m) => Some(m.received_at),
            Packet::Calibration(c) => Some(c.received_at),
            Packet::DecodeError { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Packet::DecodeError { .. })
    }
}
