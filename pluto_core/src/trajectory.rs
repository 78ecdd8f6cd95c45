//! Minimum-jerk target trajectory.

/// Point-to-point minimum-jerk profile from `start` to `end` over `duration_s`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinJerk {
    pub start: f32,
    pub end: f32,
    pub duration_s: f32,
}

impl MinJerk {
    pub fn new(start: f32, end: f32, duration_s: f32) -> Self {
        Self {
            start,
            end,
            duration_s,
        }
    }

    /// Position at `t_s` seconds after start, and whether it is still changing.
    ///
    /// A non-positive duration jumps straight to `end`.
    pub fn sample(&self, t_s: f32) -> (f32, bool) {
        if !(self.duration_s > 0.0) {
            return (self.end, false);
        }
        let raw = t_s / self.duration_s;
        let tau = raw.clamp(0.0, 1.0);
        let s = tau * tau * tau * (10.0 - 15.0 * tau + 6.0 * tau * tau);
        (self.start + (self.end - self.start) * s, raw < 1.0)
    }
}
