//! Caller-facing view of one axis.

use serde::Serialize;
use vernier_common::motion::error::MotionError;
use vernier_common::motion::types::AxisId;

use crate::mode::MotionMode;

/// Orthogonal status flags of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AxisFlags {
    pub done: bool,
    pub moving: bool,
    /// User-high limit switch.
    pub high_limit: bool,
    /// User-low limit switch.
    pub low_limit: bool,
    pub at_home: bool,
    pub homed: bool,
    pub comm_error: bool,
    pub problem: bool,
    /// Retry budget ran out on the last move.
    pub missed: bool,
    /// Last target or jog hit the soft limits, or the readback is outside them.
    pub soft_limit_violation: bool,
}

impl AxisFlags {
    pub fn at_limit(&self) -> bool {
        self.high_limit || self.low_limit
    }
}

/// Point-in-time copy of an axis, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisSnapshot {
    pub name: String,
    pub axis: AxisId,
    pub mode: MotionMode,
    pub readback_user: f64,
    pub readback_dial: f64,
    pub readback_raw: i64,
    pub target_user: f64,
    pub target_dial: f64,
    pub target_raw: i64,
    pub retry_count: u32,
    #[serde(flatten)]
    pub flags: AxisFlags,
    pub last_error: Option<MotionError>,
}

impl AxisSnapshot {
    pub fn moving(&self) -> bool {
        self.flags.moving
    }

    pub fn done(&self) -> bool {
        self.flags.done
    }

    pub fn at_limit(&self) -> bool {
        self.flags.at_limit()
    }

    pub fn at_home(&self) -> bool {
        self.flags.at_home
    }
}
