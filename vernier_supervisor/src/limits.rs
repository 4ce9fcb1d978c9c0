//! Soft travel limits, held in dial units.

use serde::Serialize;
use vernier_common::motion::error::MotionError;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SoftLimits {
    pub low: f64,
    pub high: f64,
    pub enabled: bool,
}

impl SoftLimits {
    pub fn new(low: f64, high: f64, enabled: bool) -> Self {
        Self { low, high, enabled }
    }

    /// Limits are checked only when enabled and not both zero.
    pub fn active(&self) -> bool {
        self.enabled && !(self.low == 0.0 && self.high == 0.0)
    }

    pub fn contains(&self, dial: f64) -> bool {
        !self.active() || (self.low..=self.high).contains(&dial)
    }

    /// Check a new dial `target` replacing `previous`.
    ///
    /// A target still outside the range but closer to it than `previous`
    /// is allowed. Moves against the backlash direction are checked at the
    /// overshoot point `target - backlash`.
    pub fn check_move(
        &self,
        target: f64,
        previous: f64,
        preferred: bool,
        backlash: f64,
    ) -> Result<(), MotionError> {
        if !self.active() {
            return Ok(());
        }
        let toward_range =
            (target > self.high && target < previous) || (target < self.low && target > previous);
        if toward_range {
            return Ok(());
        }
        let checked = if preferred { target } else { target - backlash };
        if self.contains(checked) {
            Ok(())
        } else {
            Err(MotionError::SoftLimitViolation {
                target,
                low: self.low,
                high: self.high,
            })
        }
    }

    /// True when a jog at `speed` has run past a limit from `readback`.
    ///
    /// `forward` is positive dial travel.
    pub fn jog_overrun(&self, readback: f64, speed: f64, forward: bool) -> bool {
        if !self.active() {
            return false;
        }
        if forward {
            readback > self.high - speed.abs()
        } else {
            readback < self.low + speed.abs()
        }
    }
}
