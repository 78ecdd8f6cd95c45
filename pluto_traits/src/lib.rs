//! Hardware-facing seams shared by the PLUTO crates.
//!
//! The serial link is split into an inbound half that is owned by the
//! ingestion thread and an outbound half that command senders share.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Fixed serial link parameters. The device does not negotiate these.
pub mod link {
    use std::time::Duration;

    pub const BAUD_RATE: u32 = 115_200;
    /// Per-byte read timeout.
    pub const READ_TIMEOUT: Duration = Duration::from_millis(250);
    pub const WRITE_TIMEOUT: Duration = Duration::from_millis(250);
}

/// Inbound half of the device link.
pub trait LinkReader {
    /// Read a single byte, waiting at most `timeout`.
    ///
    /// `Ok(None)` means the timeout expired without data. That is the normal
    /// idle condition of a serial line and not an error.
    fn read_byte(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<Option<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Outbound half of the device link.
pub trait LinkWriter {
    /// Write a complete frame. Implementations may block up to their write timeout.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<R: LinkReader + ?Sized> LinkReader for Box<R> {
    fn read_byte(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<Option<u8>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_byte(timeout)
    }
}

impl<W: LinkWriter + ?Sized> LinkWriter for Box<W> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).write_all(bytes)
    }
}
