//! Axis identity and direction types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one axis: the controller it is wired to and its channel there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AxisId {
    /// Controller index (position in the configured controller list).
    pub controller: u16,
    /// Channel on that controller, zero-based.
    pub channel: u8,
}

impl AxisId {
    pub const fn new(controller: u16, channel: u8) -> Self {
        Self {
            controller,
            channel,
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}:a{}", self.controller, self.channel)
    }
}

/// Relationship between user and dial coordinates.
///
/// `user = direction * dial + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Positive,
    Negative,
}

impl Direction {
    /// Sign as a multiplier (`+1.0` or `-1.0`).
    #[inline]
    pub const fn sign(self) -> f64 {
        match self {
            Self::Positive => 1.0,
            Self::Negative => -1.0,
        }
    }
}

/// Requested sense of a jog or home.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sense {
    Forward,
    Reverse,
}

impl Sense {
    #[inline]
    pub const fn is_forward(self) -> bool {
        matches!(self, Self::Forward)
    }

    #[inline]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_id_display() {
        assert_eq!(AxisId::new(2, 7).to_string(), "c2:a7");
    }

    #[test]
    fn axis_ids_order_by_controller_then_channel() {
        let mut ids = vec![AxisId::new(1, 0), AxisId::new(0, 3), AxisId::new(0, 1)];
        ids.sort();
        assert_eq!(ids, vec![AxisId::new(0, 1), AxisId::new(0, 3), AxisId::new(1, 0)]);
    }

    #[test]
    fn direction_sign() {
        assert_eq!(Direction::Positive.sign(), 1.0);
        assert_eq!(Direction::Negative.sign(), -1.0);
        assert_eq!(Direction::default(), Direction::Positive);
    }

    #[test]
    fn sense_reversal() {
        assert_eq!(Sense::Forward.reversed(), Sense::Reverse);
        assert!(!Sense::Reverse.is_forward());
    }
}
