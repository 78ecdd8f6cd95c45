//! Maps `Box<dyn Error>` from the link traits to typed `PlutoError`.
//!
//! The traits in `pluto_traits` use `Box<dyn Error + Send + Sync>` so any
//! backend can plug in; this module converts those to our error enum, with an
//! optional feature-gated path for `pluto_hardware::HwError` downcasting.

use crate::error::PlutoError;

/// Map a link-boundary error to a typed `PlutoError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_link_error(e: &(dyn std::error::Error + 'static)) -> PlutoError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<pluto_hardware::error::HwError>() {
            return match hw {
                pluto_hardware::error::HwError::Timeout => PlutoError::Timeout,
                pluto_hardware::error::HwError::Io(io) => PlutoError::Io(io.to_string()),
                other => PlutoError::LinkFault(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return match io.kind() {
            std::io::ErrorKind::TimedOut => PlutoError::Timeout,
            _ => PlutoError::Io(io.to_string()),
        };
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        PlutoError::Timeout
    } else {
        PlutoError::Link(s)
    }
}
