use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum PlutoError {
    #[error("link error: {0}")]
    Link(String),
    #[error("link fault: {0}")]
    LinkFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for device")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("io error: {0}")]
    Io(String),
}

/// Caller errors raised while building an outbound command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized opcode: {0}")]
    UnrecognizedOpcode(String),
    #[error("unknown mechanism: {0}")]
    UnknownMechanism(String),
    #[error("unknown control type: {0}")]
    UnknownControlType(String),
    #[error("{opcode} expects argument: {what}")]
    MissingArgument {
        opcode: &'static str,
        what: &'static str,
    },
    #[error("{opcode}: invalid argument '{value}'")]
    InvalidArgument { opcode: &'static str, value: String },
}

/// Reasons an inbound frame is dropped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("unexpected header byte 0x{0:02X}")]
    BadHeader(u8),
    #[error("invalid length byte {0}")]
    InvalidLength(u8),
    #[error("checksum mismatch: computed 0x{computed:02X}, received 0x{received:02X}")]
    Checksum { computed: u8, received: u8 },
    #[error("incomplete frame")]
    Incomplete,
}

/// Payloads that passed framing but cannot be interpreted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("unknown data type {0}")]
    UnknownDataType(u8),
    #[error("malformed version string: {0:?}")]
    BadVersion(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing link reader")]
    MissingReader,
    #[error("missing link writer")]
    MissingWriter,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
