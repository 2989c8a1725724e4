use crate::error::{RegistryError, Result};
use crate::history::DeviceHistory;
use moist_protocol::{Calibration, DeviceId, Measurement, Packet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// One `overview()` row: what a device is doing now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOverview {
    pub device: DeviceId,
    pub latest_measurement: Option<Measurement>,
    pub latest_calibration: Option<Calibration>,
}

/// Mapping from device identity to its packet history. The single entry
/// point for ingestion is [`record_packet`](Self::record_packet); queries
/// hand out clones or read-only views, never mutable history references.
///
/// Keyed by a `BTreeMap` so reporting iterates devices in ascending id
/// order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceId, DeviceHistory>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one decoded packet into per-device state.
    ///
    /// Decode errors carry no device identity, so they are surfaced to the
    /// log and dropped — the registry only ever holds well-formed frames.
    /// For the other variants the device's history is created on first
    /// sight (get-or-create) and grows by exactly one entry. Returns
    /// whether the packet was stored.
    pub fn record_packet(&mut self, packet: &Packet) -> bool {
        let device = match packet.device() {
            Some(d) => d,
            None => {
                if let Packet::DecodeError { line, reason } = packet {
                    warn!(%reason, %line, "dropping undecodable frame");
                }
                return false;
            }
        };
        self.devices.entry(device).or_default().append(packet.clone());
        true
    }

    /// One row per device ever seen, ascending by id. Each optional field
    /// is present iff that packet kind has ever been recorded. Read-only:
    /// calling this twice without an intervening record yields identical
    /// results.
    pub fn overview(&self) -> Vec<DeviceOverview> {
        self.devices
            .iter()
            .map(|(device, history)| DeviceOverview {
                device: *device,
                latest_measurement: history.latest_measurement().cloned(),
                latest_calibration: history.latest_calibration().cloned(),
            })
            .collect()
    }

    /// Read-only view of one device's full history.
    pub fn history(&self, device: DeviceId) -> Result<&DeviceHistory> {
        self.devices
            .get(&device)
            .ok_or(RegistryError::NotFound(device))
    }

    /// Measurements of the device's current calibration epoch (see
    /// [`DeviceHistory::measurements_since_last_calibration`]). Fails only
    /// when the device has never been seen.
    pub fn measurements_since_last_calibration(
        &self,
        device: DeviceId,
    ) -> Result<Vec<Measurement>> {
        Ok(self.history(device)?.measurements_since_last_calibration())
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Serializable image of the whole registry for the persistence
    /// collaborator. Decode errors are never stored, so every snapshot
    /// round-trips exactly through [`restore`](Self::restore).
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Replace the registry's entire state with a previously taken
    /// snapshot.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        *self = bincode::deserialize(bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moist_protocol::decode_at;
    use time::OffsetDateTime;

    fn at(offset_secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000 + offset_secs).unwrap()
    }

    fn ingest(reg: &mut DeviceRegistry, line: &str, offset_secs: i64) -> Packet {
        let packet = decode_at(line, at(offset_secs));
        reg.record_packet(&packet);
        packet
    }

    #[test]
    fn latest_measurement_tracks_the_decoded_packet() {
        let mut reg = DeviceRegistry::new();
        ingest(&mut reg, "[D7PRv1-1] v100 t1m m300", 0);
        let latest = ingest(&mut reg, "[D7PRv1-1] v100 t2m m310", 1);

        let rows = reg.overview();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].device, DeviceId::new(7));
        match latest {
            Packet::Measurement(m) => {
                assert_eq!(rows[0].latest_measurement.as_ref(), Some(&m))
            }
            other => panic!("expected measurement, got {other:?}"),
        }
        assert!(rows[0].latest_calibration.is_none());
    }

    #[test]
    fn latest_calibration_tracks_the_decoded_packet() {
        let mut reg = DeviceRegistry::new();
        let latest = ingest(&mut reg, "[D7PRv1-2] t0m cd350 cw200 f1", 0);

        let rows = reg.overview();
        match latest {
            Packet::Calibration(c) => {
                assert_eq!(rows[0].latest_calibration.as_ref(), Some(&c))
            }
            other => panic!("expected calibration, got {other:?}"),
        }
        assert!(rows[0].latest_measurement.is_none());
    }

    #[test]
    fn decode_errors_never_enter_the_registry() {
        let mut reg = DeviceRegistry::new();
        let packet = ingest(&mut reg, "garbage data", 0);
        assert!(packet.is_error());
        assert_eq!(reg.device_count(), 0);
    }

    #[test]
    fn histories_grow_by_exactly_one_per_packet() {
        let mut reg = DeviceRegistry::new();
        ingest(&mut reg, "[D1PRv1-1] t1m m10", 0);
        ingest(&mut reg, "[D1PRv1-1] t2m m11", 1);
        ingest(&mut reg, "[D2PRv1-1] t1m m20", 2);

        assert_eq!(reg.device_count(), 2);
        assert_eq!(reg.history(DeviceId::new(1)).unwrap().len(), 2);
        assert_eq!(reg.history(DeviceId::new(2)).unwrap().len(), 1);
    }

    #[test]
    fn unknown_device_queries_fail_with_not_found() {
        let reg = DeviceRegistry::new();
        let missing = DeviceId::new(42);
        assert!(matches!(
            reg.history(missing),
            Err(RegistryError::NotFound(d)) if d == missing
        ));
        assert!(matches!(
            reg.measurements_since_last_calibration(missing),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn overview_is_idempotent() {
        let mut reg = DeviceRegistry::new();
        ingest(&mut reg, "[D7PRv1-1] t1m m300", 0);
        ingest(&mut reg, "[D3PRv1-2] t0m cd350 cw200", 1);
        assert_eq!(reg.overview(), reg.overview());
    }

    #[test]
    fn overview_iterates_devices_in_ascending_id_order() {
        let mut reg = DeviceRegistry::new();
        ingest(&mut reg, "[D12PRv1-1] t1m m1", 0);
        ingest(&mut reg, "[D3PRv1-1] t1m m2", 1);
        ingest(&mut reg, "[D7PRv1-1] t1m m3", 2);

        let ids: Vec<u32> = reg.overview().iter().map(|r| r.device.raw()).collect();
        assert_eq!(ids, vec![3, 7, 12]);
    }

    #[test]
    fn calibration_epoch_query_returns_ordered_window() {
        let mut reg = DeviceRegistry::new();
        let dev = DeviceId::new(5);
        ingest(&mut reg, "[D5PRv1-1] t1m m100", 0); // pre-calibration, excluded
        ingest(&mut reg, "[D5PRv1-2] t2m cd350 cw200", 10);
        ingest(&mut reg, "[D5PRv1-1] t3m m110", 20);
        ingest(&mut reg, "[D5PRv1-1] t4m m120", 30);

        let window = reg.measurements_since_last_calibration(dev).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].moisture, 110);
        assert_eq!(window[1].moisture, 120);

        let calib_at = reg
            .history(dev)
            .unwrap()
            .latest_calibration()
            .unwrap()
            .received_at;
        assert!(window.windows(2).all(|w| w[0].received_at <= w[1].received_at));
        assert!(window.iter().all(|m| m.received_at >= calib_at));
    }

    #[test]
    fn recalibration_starts_a_new_epoch() {
        let mut reg = DeviceRegistry::new();
        let dev = DeviceId::new(5);
        ingest(&mut reg, "[D5PRv1-2] t0m cd350 cw200", 0);
        ingest(&mut reg, "[D5PRv1-1] t1m m100", 10);
        ingest(&mut reg, "[D5PRv1-2] t2m cd360 cw210", 20);
        ingest(&mut reg, "[D5PRv1-1] t3m m110", 30);

        let window = reg.measurements_since_last_calibration(dev).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].moisture, 110);
    }

    #[test]
    fn epoch_query_is_empty_without_calibration_or_measurement() {
        let mut reg = DeviceRegistry::new();
        ingest(&mut reg, "[D5PRv1-1] t1m m100", 0);
        assert!(reg
            .measurements_since_last_calibration(DeviceId::new(5))
            .unwrap()
            .is_empty());

        let mut reg = DeviceRegistry::new();
        ingest(&mut reg, "[D5PRv1-2] t0m cd350 cw200", 0);
        assert!(reg
            .measurements_since_last_calibration(DeviceId::new(5))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn snapshot_restore_round_trips_the_overview() {
        let mut reg = DeviceRegistry::new();
        ingest(&mut reg, "[D9PRv1-2] v? t0m vn? vx? cd350 cw200 idx0 int5 f1", 0);
        ingest(&mut reg, "[D9PRv1-1] v? t5m m420", 10);
        ingest(&mut reg, "[D3PRv1-1] v100 t2m", 20);

        let bytes = reg.snapshot().unwrap();
        let mut restored = DeviceRegistry::new();
        restored.restore(&bytes).unwrap();

        assert_eq!(restored.overview(), reg.overview());
        assert_eq!(restored.device_count(), reg.device_count());
        assert_eq!(
            restored.history(DeviceId::new(9)).unwrap().entries(),
            reg.history(DeviceId::new(9)).unwrap().entries()
        );
    }

    #[test]
    fn scenario_calibrate_then_measure() {
        let mut reg = DeviceRegistry::new();
        ingest(&mut reg, "[D9PRv1-2] v? t0m vn? vx? cd350 cw200 idx0 int5 f1", 0);
        ingest(&mut reg, "[D9PRv1-1] v? t5m m420", 10);

        let rows = reg.overview();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].device, DeviceId::new(9));
        let calib = rows[0].latest_calibration.as_ref().unwrap();
        assert_eq!((calib.dry, calib.wet), (350, 200));
        let meas = rows[0].latest_measurement.as_ref().unwrap();
        assert_eq!(meas.moisture, 420);
    }
}
