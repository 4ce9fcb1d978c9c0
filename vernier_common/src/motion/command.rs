//! Abstract motion commands.
//!
//! A supervisor never speaks vendor syntax. It builds [`CommandRequest`]s
//! carrying a [`CommandKind`] and one numeric parameter already converted to
//! raw controller units (steps, steps/s, steps/s²). The vendor encoder turns
//! each request into wire bytes.

use serde::{Deserialize, Serialize};

use super::types::AxisId;

/// Abstract command set understood by every vendor encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Absolute move to `param` raw steps.
    MoveAbsolute,
    /// Relative move by `param` raw steps.
    MoveRelative,
    /// Home search in the positive raw direction.
    HomeForward,
    /// Home search in the negative raw direction.
    HomeReverse,
    /// Redefine the controller's raw position as `param` without moving.
    LoadPosition,
    /// Base (start/stop) velocity in steps/s.
    SetBaseVelocity,
    /// Slew velocity in steps/s.
    SetVelocity,
    /// Acceleration in steps/s².
    SetAcceleration,
    /// Start the previously loaded move.
    Go,
    /// Encoder-to-motor count ratio.
    SetEncoderRatio,
    /// Request a fresh status read.
    GetInfo,
    /// Decelerate to a stop.
    Stop,
    /// Constant-velocity motion at signed `param` steps/s.
    Jog,
    /// Change the velocity of a jog already in progress.
    JogVelocity,
    /// Energise the drive.
    EnableTorque,
    /// De-energise the drive.
    DisableTorque,
}

/// How the concurrency core treats a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// Starts a positioning move; the axis joins the motion set.
    Motion,
    /// Starts constant-velocity motion; the axis joins the motion set.
    Velocity,
    /// Answered by an immediate status read.
    Info,
    /// Sent and forgotten.
    Immediate,
}

impl CommandKind {
    /// Message class used by the poller when dispatching this command.
    pub const fn class(self) -> MessageClass {
        match self {
            Self::MoveAbsolute
            | Self::MoveRelative
            | Self::HomeForward
            | Self::HomeReverse
            | Self::Go => MessageClass::Motion,
            Self::Jog | Self::JogVelocity => MessageClass::Velocity,
            Self::GetInfo => MessageClass::Info,
            _ => MessageClass::Immediate,
        }
    }

    /// True for commands that begin or redirect motion.
    #[inline]
    pub const fn starts_motion(self) -> bool {
        matches!(self.class(), MessageClass::Motion | MessageClass::Velocity)
    }
}

/// Command sent once the axis that carries it reports motion complete.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FollowUp {
    pub kind: CommandKind,
    pub param: f64,
}

/// One queued command for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub axis: AxisId,
    pub kind: CommandKind,
    pub param: f64,
    pub follow_up: Option<FollowUp>,
}

impl CommandRequest {
    pub const fn new(axis: AxisId, kind: CommandKind, param: f64) -> Self {
        Self {
            axis,
            kind,
            param,
            follow_up: None,
        }
    }

    /// Request without a numeric parameter.
    pub const fn bare(axis: AxisId, kind: CommandKind) -> Self {
        Self::new(axis, kind, 0.0)
    }

    /// Attach a command to be sent when this request's motion completes.
    pub const fn with_follow_up(mut self, kind: CommandKind, param: f64) -> Self {
        self.follow_up = Some(FollowUp { kind, param });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_and_homes_are_motion_class() {
        for kind in [
            CommandKind::MoveAbsolute,
            CommandKind::MoveRelative,
            CommandKind::HomeForward,
            CommandKind::HomeReverse,
            CommandKind::Go,
        ] {
            assert_eq!(kind.class(), MessageClass::Motion, "{kind:?}");
            assert!(kind.starts_motion());
        }
    }

    #[test]
    fn jog_is_velocity_class() {
        assert_eq!(CommandKind::Jog.class(), MessageClass::Velocity);
        assert!(CommandKind::JogVelocity.starts_motion());
    }

    #[test]
    fn setup_commands_are_immediate() {
        for kind in [
            CommandKind::SetVelocity,
            CommandKind::SetBaseVelocity,
            CommandKind::SetAcceleration,
            CommandKind::Stop,
            CommandKind::LoadPosition,
        ] {
            assert_eq!(kind.class(), MessageClass::Immediate, "{kind:?}");
            assert!(!kind.starts_motion());
        }
        assert_eq!(CommandKind::GetInfo.class(), MessageClass::Info);
    }

    #[test]
    fn follow_up_is_attached() {
        let axis = AxisId::new(0, 1);
        let req = CommandRequest::new(axis, CommandKind::MoveAbsolute, 100.0)
            .with_follow_up(CommandKind::DisableTorque, 0.0);
        assert_eq!(
            req.follow_up,
            Some(FollowUp {
                kind: CommandKind::DisableTorque,
                param: 0.0
            })
        );
        assert!(CommandRequest::bare(axis, CommandKind::Go).follow_up.is_none());
    }
}
