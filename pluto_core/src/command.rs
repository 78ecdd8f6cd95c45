//! Host-to-device commands: opcode table, argument encoding and label parsing.

use std::str::FromStr;

use crate::device::{ControlType, Mechanism};
use crate::error::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    GetVersion = 0,
    Calibrate = 1,
    StartStream = 2,
    StopStream = 3,
    SetControlType = 4,
    SetControlTarget = 5,
    SetDiagnostics = 6,
    SetControlBound = 7,
    ResetPacketNumber = 8,
    SetRomMidpoint = 9,
    Heartbeat = 10,
}

impl Opcode {
    pub const ALL: [Self; 11] = [
        Self::GetVersion,
        Self::Calibrate,
        Self::StartStream,
        Self::StopStream,
        Self::SetControlType,
        Self::SetControlTarget,
        Self::SetDiagnostics,
        Self::SetControlBound,
        Self::ResetPacketNumber,
        Self::SetRomMidpoint,
        Self::Heartbeat,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::GetVersion => "GET_VERSION",
            Self::Calibrate => "CALIBRATE",
            Self::StartStream => "START_STREAM",
            Self::StopStream => "STOP_STREAM",
            Self::SetControlType => "SET_CONTROL_TYPE",
            Self::SetControlTarget => "SET_CONTROL_TARGET",
            Self::SetDiagnostics => "SET_DIAGNOSTICS",
            Self::SetControlBound => "SET_CONTROL_BOUND",
            Self::ResetPacketNumber => "RESET_PACKETNO",
            Self::SetRomMidpoint => "SET_ROM_MIDPOINT",
            Self::Heartbeat => "HEARTBEAT",
        }
    }

    /// Look up an opcode by its protocol label (case-insensitive).
    pub fn from_label(label: &str) -> Result<Self, CommandError> {
        let l = label.trim();
        Self::ALL
            .into_iter()
            .find(|op| op.label().eq_ignore_ascii_case(l))
            .ok_or_else(|| CommandError::UnrecognizedOpcode(label.to_string()))
    }
}

impl FromStr for Opcode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Semantic command with typed arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    GetVersion,
    Calibrate(Mechanism),
    StartStream,
    StopStream,
    SetControlType(ControlType),
    /// Target in degrees; optional reach duration in seconds.
    SetControlTarget { target: f32, duration: Option<f32> },
    SetDiagnostics,
    /// Fraction in [0, 1]; clamped when encoded.
    SetControlBound(f32),
    ResetPacketNumber,
    /// Signed ROM midpoint offset in degrees.
    SetRomMidpoint(i8),
    Heartbeat,
}

/// Map a bound fraction to the wire byte: clamp to [0, 1], scale by 255, truncate.
#[inline]
pub fn control_bound_byte(bound: f32) -> u8 {
    // NaN casts to 0.
    (bound.clamp(0.0, 1.0) * 255.0) as u8
}

impl Command {
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::GetVersion => Opcode::GetVersion,
            Self::Calibrate(_) => Opcode::Calibrate,
            Self::StartStream => Opcode::StartStream,
            Self::StopStream => Opcode::StopStream,
            Self::SetControlType(_) => Opcode::SetControlType,
            Self::SetControlTarget { .. } => Opcode::SetControlTarget,
            Self::SetDiagnostics => Opcode::SetDiagnostics,
            Self::SetControlBound(_) => Opcode::SetControlBound,
            Self::ResetPacketNumber => Opcode::ResetPacketNumber,
            Self::SetRomMidpoint(_) => Opcode::SetRomMidpoint,
            Self::Heartbeat => Opcode::Heartbeat,
        }
    }

    /// Opcode followed by argument bytes, without framing.
    pub fn encode(&self) -> Vec<u8> {
        let mut msg = Vec::with_capacity(9);
        msg.push(self.opcode().code());
        match *self {
            Self::Calibrate(mech) => msg.push(mech.index()),
            Self::SetControlType(ct) => msg.push(ct.code()),
            Self::SetControlTarget { target, duration } => {
                msg.extend_from_slice(&target.to_le_bytes());
                if let Some(d) = duration {
                    msg.extend_from_slice(&d.to_le_bytes());
                }
            }
            Self::SetControlBound(b) => msg.push(control_bound_byte(b)),
            Self::SetRomMidpoint(m) => msg.extend_from_slice(&m.to_le_bytes()),
            Self::GetVersion
            | Self::StartStream
            | Self::StopStream
            | Self::SetDiagnostics
            | Self::ResetPacketNumber
            | Self::Heartbeat => {}
        }
        msg
    }

    /// Complete outbound frame for this command.
    pub fn to_frame(&self) -> Vec<u8> {
        crate::frame::encode_outbound(&self.encode())
    }

    /// Parse an unframed message back into a command.
    ///
    /// `SetControlBound` comes back as `byte / 255`, so it matches the encoded
    /// bound only up to the byte quantization.
    pub fn decode(msg: &[u8]) -> Result<Self, CommandError> {
        let Some((&code, args)) = msg.split_first() else {
            return Err(CommandError::UnrecognizedOpcode(String::new()));
        };
        let op = Opcode::from_code(code)
            .ok_or_else(|| CommandError::UnrecognizedOpcode(code.to_string()))?;
        let byte = |what: &'static str| {
            args.first().copied().ok_or(CommandError::MissingArgument {
                opcode: op.label(),
                what,
            })
        };
        let f32_at = |i: usize| {
            args.get(i..i + 4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        };
        Ok(match op {
            Opcode::GetVersion => Self::GetVersion,
            Opcode::Calibrate => {
                let idx = byte("mechanism")?;
                Self::Calibrate(Mechanism::from_index(idx).ok_or_else(|| {
                    CommandError::UnknownMechanism(idx.to_string())
                })?)
            }
            Opcode::StartStream => Self::StartStream,
            Opcode::StopStream => Self::StopStream,
            Opcode::SetControlType => Self::SetControlType(ControlType::from_code(byte("control type")?)),
            Opcode::SetControlTarget => Self::SetControlTarget {
                target: f32_at(0).ok_or(CommandError::MissingArgument {
                    opcode: op.label(),
                    what: "target",
                })?,
                duration: f32_at(4),
            },
            Opcode::SetDiagnostics => Self::SetDiagnostics,
            Opcode::SetControlBound => Self::SetControlBound(f32::from(byte("bound")?) / 255.0),
            Opcode::ResetPacketNumber => Self::ResetPacketNumber,
            Opcode::SetRomMidpoint => Self::SetRomMidpoint(i8::from_le_bytes([byte("midpoint")?])),
            Opcode::Heartbeat => Self::Heartbeat,
        })
    }

    /// Build a command from a label and textual arguments, e.g.
    /// `("SET_CONTROL_TARGET", ["30", "2.0"])`.
    pub fn from_label(label: &str, args: &[&str]) -> Result<Self, CommandError> {
        let op = Opcode::from_label(label)?;
        let arg = |i: usize, what: &'static str| {
            args.get(i).copied().ok_or(CommandError::MissingArgument {
                opcode: op.label(),
                what,
            })
        };
        let parse_f32 = |s: &str| {
            s.trim()
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| CommandError::InvalidArgument {
                    opcode: op.label(),
                    value: s.to_string(),
                })
        };
        Ok(match op {
            Opcode::GetVersion => Self::GetVersion,
            Opcode::Calibrate => Self::Calibrate(Mechanism::from_label(arg(0, "mechanism")?)?),
            Opcode::StartStream => Self::StartStream,
            Opcode::StopStream => Self::StopStream,
            Opcode::SetControlType => {
                Self::SetControlType(ControlType::from_label(arg(0, "control type")?)?)
            }
            Opcode::SetControlTarget => Self::SetControlTarget {
                target: parse_f32(arg(0, "target")?)?,
                duration: args.get(1).map(|s| parse_f32(s)).transpose()?,
            },
            Opcode::SetDiagnostics => Self::SetDiagnostics,
            Opcode::SetControlBound => {
                let raw = arg(0, "bound")?;
                let b = parse_f32(raw)?;
                if !(0.0..=1.0).contains(&b) {
                    return Err(CommandError::InvalidArgument {
                        opcode: op.label(),
                        value: raw.to_string(),
                    });
                }
                Self::SetControlBound(b)
            }
            Opcode::ResetPacketNumber => Self::ResetPacketNumber,
            Opcode::SetRomMidpoint => {
                let raw = arg(0, "midpoint")?;
                Self::SetRomMidpoint(raw.trim().parse::<i8>().map_err(|_| {
                    CommandError::InvalidArgument {
                        opcode: op.label(),
                        value: raw.to_string(),
                    }
                })?)
            }
            Opcode::Heartbeat => Self::Heartbeat,
        })
    }
}

/// Anything that can deliver commands to the device.
///
/// Sending is fire-and-forget: failures are logged and counted by the sink.
pub trait CommandSink {
    fn send(&self, cmd: &Command);
}

impl<T: CommandSink + ?Sized> CommandSink for &T {
    fn send(&self, cmd: &Command) {
        (**self).send(cmd);
    }
}

impl<T: CommandSink + ?Sized> CommandSink for std::sync::Arc<T> {
    fn send(&self, cmd: &Command) {
        (**self).send(cmd);
    }
}
