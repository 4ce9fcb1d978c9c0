//! User / dial / raw unit conversion.
//!
//! ```text
//! user = direction * dial + offset
//! dial = raw * resolution
//! raw  = nint(dial / resolution)
//! ```
//!
//! Dial units are the stage's engineering units with the user sign and
//! offset removed. Raw units are controller steps (or encoder counts).

use serde::{Deserialize, Serialize};

use super::types::Direction;

/// Round to nearest integer, halves away from zero.
#[inline]
pub fn nint(value: f64) -> i64 {
    value.round() as i64
}

/// Calibration of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Motor resolution, dial units per step. Never zero.
    pub resolution: f64,
    /// Encoder resolution, dial units per count. Never zero.
    pub encoder_resolution: f64,
    pub offset: f64,
    pub direction: Direction,
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new(1.0, 0.0, Direction::Positive)
    }
}

impl Calibration {
    /// Calibration with encoder resolution equal to motor resolution.
    pub fn new(resolution: f64, offset: f64, direction: Direction) -> Self {
        Self {
            resolution,
            encoder_resolution: resolution,
            offset,
            direction,
        }
    }

    #[inline]
    pub fn user_to_dial(&self, user: f64) -> f64 {
        (user - self.offset) / self.direction.sign()
    }

    #[inline]
    pub fn dial_to_user(&self, dial: f64) -> f64 {
        self.direction.sign() * dial + self.offset
    }

    #[inline]
    pub fn dial_to_raw(&self, dial: f64) -> i64 {
        nint(dial / self.resolution)
    }

    #[inline]
    pub fn raw_to_dial(&self, raw: f64) -> f64 {
        raw * self.resolution
    }

    #[inline]
    pub fn encoder_to_dial(&self, counts: f64) -> f64 {
        counts * self.encoder_resolution
    }

    /// Dial-unit speed (or acceleration) to steps per second.
    #[inline]
    pub fn speed_to_raw(&self, speed: f64) -> f64 {
        speed / self.resolution.abs()
    }

    /// User limits `(low, high)` to dial limits `(low, high)`.
    ///
    /// A negative direction swaps which user limit bounds which dial side.
    pub fn user_limits_to_dial(&self, low: f64, high: f64) -> (f64, f64) {
        match self.direction {
            Direction::Positive => (low - self.offset, high - self.offset),
            Direction::Negative => (self.offset - high, self.offset - low),
        }
    }

    /// Dial limits `(low, high)` to user limits `(low, high)`.
    pub fn dial_limits_to_user(&self, dial_low: f64, dial_high: f64) -> (f64, f64) {
        match self.direction {
            Direction::Positive => (dial_low + self.offset, dial_high + self.offset),
            Direction::Negative => (self.offset - dial_high, self.offset - dial_low),
        }
    }

    /// True when a positive dial move is a positive raw move.
    #[inline]
    pub fn raw_follows_dial(&self) -> bool {
        self.resolution >= 0.0
    }

    /// True when user and raw coordinates increase together.
    #[inline]
    pub fn raw_follows_user(&self) -> bool {
        (self.direction == Direction::Positive) == self.raw_follows_dial()
    }
}

/// The same position expressed in all three coordinate systems.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub user: f64,
    pub dial: f64,
    pub raw: i64,
}

impl Position {
    pub fn from_user(cal: &Calibration, user: f64) -> Self {
        let dial = cal.user_to_dial(user);
        Self {
            user,
            dial,
            raw: cal.dial_to_raw(dial),
        }
    }

    pub fn from_dial(cal: &Calibration, dial: f64) -> Self {
        Self {
            user: cal.dial_to_user(dial),
            dial,
            raw: cal.dial_to_raw(dial),
        }
    }

    pub fn from_raw(cal: &Calibration, raw: f64) -> Self {
        let dial = cal.raw_to_dial(raw);
        Self {
            user: cal.dial_to_user(dial),
            dial,
            raw: nint(raw),
        }
    }
}
