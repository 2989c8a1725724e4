//! moist-protocol: line-oriented telemetry protocol for soil-moisture nodes
//!
//! Sensor nodes emit one frame per line over a serial link. Every frame
//! starts with a bracketed preamble `[D<id>PRv<ver>-<type>]` followed by a
//! body of prefix-tagged tokens. This crate turns such a line into a typed
//! [`Packet`]; it holds no state and never fails — malformed input comes
//! back as [`Packet::DecodeError`].

mod types;
pub use types::{Calibration, DeviceId, Measurement, Packet};

mod decode;
pub use decode::{decode, decode_at};
