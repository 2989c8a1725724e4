use crate::types::{Calibration, DeviceId, Measurement, Packet};
use time::OffsetDateTime;

/// Decode one raw line into a [`Packet`], stamping the current UTC time as
/// the arrival timestamp. Total: malformed input yields
/// [`Packet::DecodeError`], never a panic or a partially filled frame.
pub fn decode(line: &str) -> Packet {
    decode_at(line, OffsetDateTime::now_utc())
}

/// Same as [`decode`] with a caller-supplied arrival clock (replay, tests).
///
/// The preamble `[D<id>PRv<ver>-<type>]` is strict: if it is missing, its
/// integers do not parse, or the type code is unknown, the whole line is a
/// decode error. Body tokens are looked up independently by prefix, in any
/// order; an absent or unparsable token (including the `?` voltage
/// sentinel) takes the value 0 rather than failing the frame. That
/// asymmetry is the protocol's working design: nodes on flaky links emit
/// partially garbled bodies far more often than garbled preambles.
pub fn decode_at(line: &str, received_at: OffsetDateTime) -> Packet {
    let (pre, body_start) = match find_preamble(line) {
        Some(found) => found,
        None => return decode_error(line, "no valid [D..PRv..-..] preamble"),
    };
    let body = &line[body_start..];
    let device = DeviceId::new(pre.device);

    match pre.kind {
        1 => Packet::Measurement(Measurement {
            device,
            protocol_version: pre.version,
            received_at,
            uptime_min: elapsed_minutes(body),
            moisture: field_u32(body, "m"),
            voltage: field_u32(body, "v"),
        }),
        2 => Packet::Calibration(Calibration {
            device,
            protocol_version: pre.version,
            received_at,
            uptime_min: elapsed_minutes(body),
            voltage: field_u32(body, "v"),
            dry: field_u32(body, "cd"),
            wet: field_u32(body, "cw"),
            voltage_min: field_u32(body, "vn"),
            voltage_max: field_u32(body, "vx"),
            interval_idx: field_u32(body, "idx"),
            interval: field_u32(body, "int"),
            first_since_boot: field_u32(body, "f") != 0,
        }),
        other => decode_error(line, format!("unknown packet type {other}")),
    }
}

fn decode_error(line: &str, reason: impl Into<String>) -> Packet {
    Packet::DecodeError {
        line: line.to_string(),
        reason: reason.into(),
    }
}

struct Preamble {
    device: u32,
    version: u32,
    kind: u32,
}

/// Locate the first parsable preamble anywhere in the line and return it
/// together with the byte offset where the body begins.
fn find_preamble(line: &str) -> Option<(Preamble, usize)> {
    let mut start = 0;
    while let Some(pos) = line[start..].find("[D") {
        let at = start + pos;
        if let Some((pre, consumed)) = parse_preamble(&line[at..]) {
            return Some((pre, at + consumed));
        }
        start = at + 1;
    }
    None
}

fn parse_preamble(s: &str) -> Option<(Preamble, usize)> {
    let rest = s.strip_prefix("[D")?;
    let (device, rest) = take_u32(rest)?;
    let rest = rest.strip_prefix("PRv")?;
    let (version, rest) = take_u32(rest)?;
    let rest = rest.strip_prefix('-')?;
    let (kind, rest) = take_u32(rest)?;
    let rest = rest.strip_prefix(']')?;
    Some((
        Preamble {
            device,
            version,
            kind,
        },
        s.len() - rest.len(),
    ))
}

/// Leading decimal run of `s`, parsed. None on empty run or overflow.
fn take_u32(s: &str) -> Option<(u32, &str)> {
    let n = digit_run(s);
    if n == 0 {
        return None;
    }
    let value = s[..n].parse().ok()?;
    Some((value, &s[n..]))
}

fn digit_run(s: &str) -> usize {
    s.bytes().take_while(|b| b.is_ascii_digit()).count()
}

/// Safe-parse body lookup: first occurrence of `prefix` immediately followed
/// by a digit run, defaulting to 0 when absent or unparsable. Prefixes that
/// embed other prefixes (`v` inside `vn`/`vx`, `t` inside `int`) cannot
/// collide because the longer token has no digit directly after the shorter
/// prefix.
fn field_u32(body: &str, prefix: &str) -> u32 {
    scan_digits(body, prefix)
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

fn scan_digits<'a>(body: &'a str, prefix: &str) -> Option<&'a str> {
    let mut start = 0;
    while let Some(pos) = body[start..].find(prefix) {
        let at = start + pos;
        let rest = &body[at + prefix.len()..];
        let n = digit_run(rest);
        if n > 0 {
            return Some(&rest[..n]);
        }
        start = at + 1;
    }
    None
}

/// Device elapsed time `t<digits><h|m>`, normalized to minutes. The unit
/// suffix is required to accept a candidate, which keeps the `t` inside
/// `int5` from matching.
fn elapsed_minutes(body: &str) -> u32 {
    let mut start = 0;
    while let Some(pos) = body[start..].find('t') {
        let at = start + pos;
        let rest = &body[at + 1..];
        let n = digit_run(rest);
        if n > 0 {
            let value: u32 = rest[..n].parse().unwrap_or(0);
            match rest.as_bytes().get(n) {
                Some(b'm') => return value,
                Some(b'h') => return value.saturating_mul(60),
                _ => {}
            }
        }
        start = at + 1;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn at() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn decodes_measurement_frame() {
        let pkt = decode_at("[D9PRv1-1] v3300 t5m m420", at());
        match pkt {
            Packet::Measurement(m) => {
                assert_eq!(m.device, DeviceId::new(9));
                assert_eq!(m.protocol_version, 1);
                assert_eq!(m.voltage, 3300);
                assert_eq!(m.uptime_min, 5);
                assert_eq!(m.moisture, 420);
                assert_eq!(m.received_at, at());
            }
            other => panic!("expected measurement, got {other:?}"),
        }
    }

    #[test]
    fn decodes_calibration_frame() {
        let pkt = decode_at("[D9PRv1-2] v? t0m vn? vx? cd350 cw200 idx0 int5 f1", at());
        match pkt {
            Packet::Calibration(c) => {
                assert_eq!(c.device, DeviceId::new(9));
                assert_eq!(c.dry, 350);
                assert_eq!(c.wet, 200);
                assert_eq!(c.voltage, 0);
                assert_eq!(c.voltage_min, 0);
                assert_eq!(c.voltage_max, 0);
                assert_eq!(c.interval_idx, 0);
                assert_eq!(c.interval, 5);
                assert!(c.first_since_boot);
            }
            other => panic!("expected calibration, got {other:?}"),
        }
    }

    #[test]
    fn hour_suffix_normalizes_to_minutes() {
        match decode_at("[D1PRv1-1] v100 t3h m10", at()) {
            Packet::Measurement(m) => assert_eq!(m.uptime_min, 180),
            other => panic!("expected measurement, got {other:?}"),
        }
    }

    #[test]
    fn body_tokens_are_order_insensitive() {
        let a = decode_at("[D4PRv2-1] m77 v12 t9m", at());
        let b = decode_at("[D4PRv2-1] v12 t9m m77", at());
        assert_eq!(a, b);
    }

    #[test]
    fn missing_moisture_token_defaults_to_zero() {
        // Lenient body: only the preamble is mandatory.
        match decode_at("[D3PRv1-1] v100 t2m", at()) {
            Packet::Measurement(m) => {
                assert_eq!(m.device, DeviceId::new(3));
                assert_eq!(m.moisture, 0);
                assert_eq!(m.voltage, 100);
                assert_eq!(m.uptime_min, 2);
            }
            other => panic!("expected measurement, got {other:?}"),
        }
    }

    #[test]
    fn unknown_voltage_sentinel_decodes_to_zero() {
        match decode_at("[D9PRv1-1] v? t5m m420", at()) {
            Packet::Measurement(m) => assert_eq!(m.voltage, 0),
            other => panic!("expected measurement, got {other:?}"),
        }
    }

    #[test]
    fn garbage_line_is_a_decode_error_carrying_the_input() {
        match decode_at("garbage data", at()) {
            Packet::DecodeError { line, .. } => assert_eq!(line, "garbage data"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_packet_type_is_a_decode_error() {
        let raw = "[D5PRv1-7] v100 t1m";
        match decode_at(raw, at()) {
            Packet::DecodeError { line, reason } => {
                assert_eq!(line, raw);
                assert!(reason.contains('7'));
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn truncated_preamble_is_a_decode_error() {
        assert!(decode_at("[D12PRv1-1 v100 t1m m5", at()).is_error());
        assert!(decode_at("[DPRv1-1] m5", at()).is_error());
    }

    #[test]
    fn preamble_may_start_after_leading_noise() {
        match decode_at("boot: [D2PRv1-1] t1m m33", at()) {
            Packet::Measurement(m) => {
                assert_eq!(m.device, DeviceId::new(2));
                assert_eq!(m.moisture, 33);
            }
            other => panic!("expected measurement, got {other:?}"),
        }
    }

    #[test]
    fn flag_zero_is_false() {
        match decode_at("[D9PRv1-2] t0m cd350 cw200 f0", at()) {
            Packet::Calibration(c) => assert!(!c.first_since_boot),
            other => panic!("expected calibration, got {other:?}"),
        }
    }

    #[test]
    fn min_max_voltage_tokens_do_not_bleed_into_plain_voltage() {
        match decode_at("[D9PRv1-2] t0m vn45 vx67 cd350 cw200", at()) {
            Packet::Calibration(c) => {
                assert_eq!(c.voltage, 0);
                assert_eq!(c.voltage_min, 45);
                assert_eq!(c.voltage_max, 67);
            }
            other => panic!("expected calibration, got {other:?}"),
        }
    }
}
