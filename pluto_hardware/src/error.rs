use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("failed to open serial port {port}: {reason}")]
    PortOpen { port: String, reason: String },
    #[error("serial error: {0}")]
    Serial(String),
    #[error("serial write timeout")]
    Timeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
