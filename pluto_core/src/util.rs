//! Tick period helpers.

pub const MILLIS_PER_SEC: u64 = 1_000;

/// Period in milliseconds for a rate in Hz, never below 1 ms.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}
