//! Payload decoder: turns accepted frame payloads into `DeviceState` and
//! edge-triggered `DeviceEvent`s.
//!
//! Payload layout (offsets from the first byte after the length byte):
//!
//! ```text
//! 0        status      [7:4] data type, [3:1] control type, [0] calibrated
//! 1, 2     error word  255*hi + lo
//! 3        mech/act    [7:4] mechanism, [0] actuated
//! 4..6     packet no.  u16 LE                       (stream variants)
//! 6..10    run time    u32 LE, ms                   (stream variants)
//! 10..     n x f32 LE  angle control target desired [err errDiff errSum]
//! 10+4n    bound byte, 11+4n direction, 12+4n ROM midpoint, 13+4n button
//! ```
//!
//! VERSION payloads carry `id,version,date` as ASCII from offset 4.

use std::time::Instant;

use crate::device::{ControlType, DataType, DeviceIdentity, DeviceState};
use crate::error::DecodeError;

const HEADER_LEN: usize = 4;
const COUNTERS_LEN: usize = 6;
const TRAILER_LEN: usize = 4;

/// Events raised by a decode, in delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Button went from pressed (0) to released (1).
    ButtonReleased,
    ControlModeChanged { from: ControlType, to: ControlType },
    /// A SENSORSTREAM or DIAGNOSTICS payload was decoded.
    NewData,
}

/// Bytes a payload of the given variant must have.
pub const fn required_len(data_type: DataType) -> usize {
    match data_type {
        DataType::SensorStream | DataType::Diagnostics => {
            HEADER_LEN + COUNTERS_LEN + 4 * data_type.sensor_count() + TRAILER_LEN
        }
        DataType::ControlParam | DataType::Version => HEADER_LEN,
    }
}

#[inline]
fn f32_at(p: &[u8], i: usize) -> f32 {
    f32::from_le_bytes([p[i], p[i + 1], p[i + 2], p[i + 3]])
}

/// Single-writer owner of the current and previous device state.
#[derive(Debug, Default)]
pub struct Decoder {
    current: DeviceState,
    previous: DeviceState,
    identity: Option<DeviceIdentity>,
    last_rx: Option<Instant>,
    frame_rate: f32,
    decoded: u64,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &DeviceState {
        &self.current
    }

    pub fn previous(&self) -> &DeviceState {
        &self.previous
    }

    /// Identity from the first well-formed VERSION payload.
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Frames per second, from the host receipt times of the last two payloads.
    pub fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Decode one payload received at `received_at`.
    ///
    /// On error the state is left untouched. Edge events are not raised for
    /// the very first payload, since there is no real previous state yet.
    pub fn decode(
        &mut self,
        payload: &[u8],
        received_at: Instant,
    ) -> Result<Vec<DeviceEvent>, DecodeError> {
        if payload.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                needed: HEADER_LEN,
                got: payload.len(),
            });
        }
        let status = payload[0];
        let data_type = DataType::from_code(status >> 4)?;
        let needed = required_len(data_type);
        if payload.len() < needed {
            return Err(DecodeError::Truncated {
                needed,
                got: payload.len(),
            });
        }
        let version = if data_type == DataType::Version && self.identity.is_none() {
            let text = String::from_utf8_lossy(&payload[HEADER_LEN..]);
            Some(DeviceIdentity::parse(&text)?)
        } else {
            None
        };

        self.previous = self.current;
        let mut next = self.current;
        next.data_type = data_type;
        next.control_type = ControlType::from_code((status & 0x0E) >> 1);
        next.calibrated = status & 0x01 != 0;
        next.error_bits = 255 * u16::from(payload[2]) + u16::from(payload[1]);
        next.mechanism = payload[3] >> 4;
        next.actuated = payload[3] & 0x01 != 0;

        if data_type.is_stream() {
            next.packet_number = u16::from_le_bytes([payload[4], payload[5]]);
            next.run_time_ms = u32::from_le_bytes([payload[6], payload[7], payload[8], payload[9]]);
            let n = data_type.sensor_count();
            let base = HEADER_LEN + COUNTERS_LEN;
            next.angle = f32_at(payload, base);
            next.control = f32_at(payload, base + 4);
            next.target = f32_at(payload, base + 8);
            next.desired = f32_at(payload, base + 12);
            if data_type == DataType::Diagnostics {
                next.err = f32_at(payload, base + 16);
                next.err_diff = f32_at(payload, base + 20);
                next.err_sum = f32_at(payload, base + 24);
            }
            let t = base + 4 * n;
            next.control_bound = f32::from(payload[t]) / 255.0;
            next.control_direction = (payload[t + 1] as i8).clamp(-1, 1);
            next.rom_midpoint = payload[t + 2] as i8;
            next.button = payload[t + 3];
        }
        self.current = next;

        if let Some(id) = version {
            tracing::info!(
                device_id = %id.device_id,
                firmware = %id.firmware_version,
                compiled = %id.compile_date,
                "device identified"
            );
            self.identity = Some(id);
        }

        self.frame_rate = match self.last_rx {
            Some(prev) => {
                let dt = received_at.saturating_duration_since(prev).as_secs_f32();
                if dt > 0.0 { 1.0 / dt } else { 0.0 }
            }
            None => 0.0,
        };
        self.last_rx = Some(received_at);
        let first = self.decoded == 0;
        self.decoded += 1;

        if self.current.error_bits != 0 && self.current.error_bits != self.previous.error_bits {
            tracing::warn!(errors = ?self.current.error_names(), "device reports error conditions");
        }

        let mut events = Vec::with_capacity(3);
        if !first {
            if self.previous.button == 0 && self.current.button == 1 {
                events.push(DeviceEvent::ButtonReleased);
            }
            if self.previous.control_type != self.current.control_type {
                events.push(DeviceEvent::ControlModeChanged {
                    from: self.previous.control_type,
                    to: self.current.control_type,
                });
            }
        }
        if data_type.is_stream() {
            events.push(DeviceEvent::NewData);
        }
        Ok(events)
    }
}

/// Build a stream payload from a state, laid out as the device sends it.
///
/// Used by tests and benches to produce realistic traffic.
pub fn encode_stream_payload(state: &DeviceState) -> Vec<u8> {
    let dt = if state.data_type == DataType::Diagnostics {
        DataType::Diagnostics
    } else {
        DataType::SensorStream
    };
    let mut p = Vec::with_capacity(required_len(dt));
    p.push((dt.code() << 4) | ((state.control_type.code() & 0x07) << 1) | u8::from(state.calibrated));
    p.push((state.error_bits % 255) as u8);
    p.push((state.error_bits / 255) as u8);
    p.push((state.mechanism << 4) | u8::from(state.actuated));
    p.extend_from_slice(&state.packet_number.to_le_bytes());
    p.extend_from_slice(&state.run_time_ms.to_le_bytes());
    let mut sensors = vec![state.angle, state.control, state.target, state.desired];
    if dt == DataType::Diagnostics {
        sensors.extend_from_slice(&[state.err, state.err_diff, state.err_sum]);
    }
    for v in sensors {
        p.extend_from_slice(&v.to_le_bytes());
    }
    p.push(crate::command::control_bound_byte(state.control_bound));
    p.push(state.control_direction as u8);
    p.push(state.rom_midpoint as u8);
    p.push(state.button);
    p
}
