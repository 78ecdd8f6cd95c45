//! Device-level vocabulary: data types, control types, mechanisms and the
//! decoded state snapshot.

use crate::error::{CommandError, DecodeError};

/// Hand open/close scale: displacement units per degree of motor angle.
pub const HOC_SCALE: f32 = 0.107_52;

/// Advisory error conditions in bit order of the device error word.
pub const ERROR_NAMES: [&str; 3] = ["ANGSENSERR", "MCURRSENSERR", "NOHEARTBEAT"];

/// Payload variant, taken from the high nibble of the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    #[default]
    SensorStream,
    ControlParam,
    Diagnostics,
    Version,
}

impl DataType {
    pub fn from_code(code: u8) -> Result<Self, DecodeError> {
        match code {
            0 => Ok(Self::SensorStream),
            1 => Ok(Self::ControlParam),
            2 => Ok(Self::Diagnostics),
            3 => Ok(Self::Version),
            other => Err(DecodeError::UnknownDataType(other)),
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            Self::SensorStream => 0,
            Self::ControlParam => 1,
            Self::Diagnostics => 2,
            Self::Version => 3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::SensorStream => "SENSORSTREAM",
            Self::ControlParam => "CONTROLPARAM",
            Self::Diagnostics => "DIAGNOSTICS",
            Self::Version => "VERSION",
        }
    }

    /// Number of f32 sensor values carried by this variant.
    pub const fn sensor_count(self) -> usize {
        match self {
            Self::SensorStream => 4,
            Self::Diagnostics => 7,
            Self::ControlParam | Self::Version => 0,
        }
    }

    /// True for the variants that carry sensor data and raise `NewData`.
    pub const fn is_stream(self) -> bool {
        matches!(self, Self::SensorStream | Self::Diagnostics)
    }
}

/// Active control law on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlType {
    #[default]
    None,
    Position,
    Resist,
    Torque,
    /// Codes the firmware may report that this host does not know.
    Unknown(u8),
}

impl ControlType {
    pub const KNOWN: [Self; 4] = [Self::None, Self::Position, Self::Resist, Self::Torque];

    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Position,
            2 => Self::Resist,
            3 => Self::Torque,
            other => Self::Unknown(other),
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Position => 1,
            Self::Resist => 2,
            Self::Torque => 3,
            Self::Unknown(c) => c,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Position => "POSITION",
            Self::Resist => "RESIST",
            Self::Torque => "TORQUE",
            Self::Unknown(_) => "UNKNOWN",
        }
    }

    pub const fn text(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Position => "Position",
            Self::Resist => "Resist",
            Self::Torque => "Torque",
            Self::Unknown(_) => "Unknown",
        }
    }

    pub fn from_label(label: &str) -> Result<Self, CommandError> {
        let l = label.trim();
        Self::KNOWN
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(l))
            .or_else(|| l.parse::<u8>().ok().filter(|&n| n < 4).map(Self::from_code))
            .ok_or_else(|| CommandError::UnknownControlType(label.to_string()))
    }
}

/// Attachable PLUTO mechanisms, in device index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    NoMech,
    Wfe,
    Wurd,
    Fps,
    Hoc,
    Fme1,
    Fme2,
}

impl Mechanism {
    pub const ALL: [Self; 7] = [
        Self::NoMech,
        Self::Wfe,
        Self::Wurd,
        Self::Fps,
        Self::Hoc,
        Self::Fme1,
        Self::Fme2,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    pub const fn index(self) -> u8 {
        self as u8
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::NoMech => "NOMECH",
            Self::Wfe => "WFE",
            Self::Wurd => "WURD",
            Self::Fps => "FPS",
            Self::Hoc => "HOC",
            Self::Fme1 => "FME1",
            Self::Fme2 => "FME2",
        }
    }

    pub const fn text(self) -> &'static str {
        match self {
            Self::NoMech => "No mechanism",
            Self::Wfe => "Wrist Flexion/Extension",
            Self::Wurd => "Wrist Ulnar/Radial Deviation",
            Self::Fps => "Forearm Pronation/Supination",
            Self::Hoc => "Hand Opening/Closing",
            Self::Fme1 => "Functional Mechanism 1",
            Self::Fme2 => "Functional Mechanism 2",
        }
    }

    /// Range of motion (degrees) the calibration check expects.
    pub const fn calibrated_angle(self) -> Option<f32> {
        match self {
            Self::Wfe | Self::Wurd => Some(136.0),
            Self::Fps => Some(180.0),
            Self::Hoc => Some(93.0),
            Self::NoMech | Self::Fme1 | Self::Fme2 => None,
        }
    }

    pub fn from_label(label: &str) -> Result<Self, CommandError> {
        let l = label.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.label().eq_ignore_ascii_case(l))
            .ok_or_else(|| CommandError::UnknownMechanism(label.to_string()))
    }
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::fmt::Display for ControlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(c) => write!(f, "UNKNOWN({c})"),
            other => f.write_str(other.label()),
        }
    }
}

/// One decoded telemetry snapshot.
///
/// Fields not carried by the last payload variant keep their previous values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceState {
    pub data_type: DataType,
    pub control_type: ControlType,
    pub calibrated: bool,
    pub error_bits: u16,
    pub mechanism: u8,
    pub actuated: bool,
    pub button: u8,
    pub packet_number: u16,
    /// Device uptime in milliseconds.
    pub run_time_ms: u32,
    pub angle: f32,
    pub control: f32,
    pub target: f32,
    /// In [0, 1].
    pub control_bound: f32,
    /// One of -1, 0, 1.
    pub control_direction: i8,
    pub rom_midpoint: i8,
    pub desired: f32,
    pub err: f32,
    pub err_diff: f32,
    pub err_sum: f32,
}

impl DeviceState {
    pub fn mechanism(&self) -> Option<Mechanism> {
        Mechanism::from_index(self.mechanism)
    }

    pub fn error_names(&self) -> Vec<&'static str> {
        error_names(self.error_bits)
    }

    /// Hand displacement, meaningful only when the HOC mechanism is attached.
    pub fn hoc_displacement(&self) -> f32 {
        hoc_displacement_from_angle(self.angle)
    }
}

/// Identification strings reported by a VERSION payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub firmware_version: String,
    pub compile_date: String,
}

impl DeviceIdentity {
    /// Parse `id,version,date`. Extra fields are ignored.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let mut parts = text.trim_end_matches('\0').split(',').map(str::trim);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(ver), Some(date)) if !id.is_empty() => Ok(Self {
                device_id: id.to_string(),
                firmware_version: ver.to_string(),
                compile_date: date.to_string(),
            }),
            _ => Err(DecodeError::BadVersion(text.to_string())),
        }
    }
}

/// Names of the conditions set in `bits`, in bit order.
pub fn error_names(bits: u16) -> Vec<&'static str> {
    ERROR_NAMES
        .iter()
        .enumerate()
        .filter(|(i, _)| bits & (1 << i) != 0)
        .map(|(_, name)| *name)
        .collect()
}

#[inline]
pub fn hoc_displacement_from_angle(angle: f32) -> f32 {
    HOC_SCALE * angle
}

#[inline]
pub fn hoc_angle_from_displacement(displacement: f32) -> f32 {
    displacement / HOC_SCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_names_follow_bit_order() {
        assert!(error_names(0).is_empty());
        assert_eq!(error_names(0b101), vec!["ANGSENSERR", "NOHEARTBEAT"]);
    }

    #[test]
    fn unknown_control_code_is_preserved() {
        assert_eq!(ControlType::from_code(6), ControlType::Unknown(6));
        assert_eq!(ControlType::Unknown(6).code(), 6);
    }

    #[test]
    fn labels_are_case_insensitive() {
        assert_eq!(Mechanism::from_label("hoc").unwrap(), Mechanism::Hoc);
        assert_eq!(ControlType::from_label("Position").unwrap(), ControlType::Position);
        assert!(matches!(
            Mechanism::from_label("ELBOW"),
            Err(CommandError::UnknownMechanism(_))
        ));
    }

    #[test]
    fn version_text_needs_three_fields() {
        let id = DeviceIdentity::parse("PLUTO-7,1.2,2024-01-01").unwrap();
        assert_eq!(id.firmware_version, "1.2");
        assert!(DeviceIdentity::parse("PLUTO-7").is_err());
    }
}
