//! Supervisor motion modes.

use serde::Serialize;
use std::time::Instant;
use vernier_common::motion::types::Sense;

/// What the supervisor is doing with its axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionMode {
    #[default]
    Idle,
    /// Slew leg toward the target (or the overshoot point).
    MovingToTarget,
    /// Final approach at backlash speed.
    MovingBacklash,
    /// Correction move after missing the retry deadband.
    Retrying,
    /// Constant-velocity motion; `sense` is in user coordinates.
    Jogging { sense: Sense },
    /// Stop sent, waiting for the axis to report done.
    Stopping,
    /// Home search; `sense` is in dial coordinates.
    Homing { sense: Sense },
    /// Raw position redefinition in flight.
    LoadingPosition,
    /// Motion stopped, waiting before judging the position.
    SettlingDelay { until: Instant },
}

impl MotionMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::MovingToTarget => "moving_to_target",
            Self::MovingBacklash => "moving_backlash",
            Self::Retrying => "retrying",
            Self::Jogging { .. } => "jogging",
            Self::Stopping => "stopping",
            Self::Homing { .. } => "homing",
            Self::LoadingPosition => "loading_position",
            Self::SettlingDelay { .. } => "settling_delay",
        }
    }

    /// Positioning toward a target: the modes the new-target monitor watches.
    pub fn is_positioning(&self) -> bool {
        matches!(
            self,
            Self::MovingToTarget | Self::MovingBacklash | Self::Retrying
        )
    }

    /// A sequence that rejects new targets until it completes.
    pub fn owns_axis(&self) -> bool {
        matches!(
            self,
            Self::Jogging { .. } | Self::Homing { .. } | Self::LoadingPosition
        )
    }
}

impl Serialize for MotionMode {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.name())
    }
}

/// What happens once a requested stop completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfterStop {
    /// Adopt the readback as the new target.
    #[default]
    Sync,
    /// Paused: keep the target, wait for `go`.
    Hold,
    /// Start toward the current target.
    NewTarget,
    /// Start a jog (user `sense`).
    Jog { sense: Sense },
    /// Jog released: approach the stop point from the backlash side.
    JogBacklash { sense: Sense },
    /// Start a home search (dial `sense`).
    Home { sense: Sense },
}
