//! Controller status as decoded from the wire, and the event the poller
//! delivers to a supervisor.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::types::AxisId;

bitflags! {
    /// Per-axis controller status bits.
    ///
    /// Limit bits are in raw (controller) direction. Encoder bits are only
    /// meaningful when `ENCODER_PRESENT` is set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusBits: u32 {
        /// Last raw direction of travel was positive.
        const DIRECTION        = 0x0001;
        /// Motion is complete.
        const DONE             = 0x0002;
        /// Positive-raw hard limit switch active.
        const PLUS_LS          = 0x0004;
        /// Home switch active.
        const HOME             = 0x0008;
        /// Encoder slip detected.
        const SLIP             = 0x0010;
        /// Closed-loop position maintenance enabled.
        const POSITION         = 0x0020;
        /// Slip or stall detected.
        const SLIP_STALL       = 0x0040;
        /// Encoder home signal active.
        const ENCODER_HOME     = 0x0080;
        /// Encoder fitted.
        const ENCODER_PRESENT  = 0x0100;
        /// Controller reports a problem with this axis.
        const PROBLEM          = 0x0200;
        /// Axis is moving.
        const MOVING           = 0x0400;
        /// Drive supports closed-loop gain settings.
        const GAIN_SUPPORT     = 0x0800;
        /// Communication with the controller failed.
        const COMM_ERR         = 0x1000;
        /// Negative-raw hard limit switch active.
        const MINUS_LS         = 0x2000;
        /// Axis has been homed since power-up.
        const HOMED            = 0x4000;
    }
}

impl StatusBits {
    /// Bits that end a move whatever the direction of travel.
    pub const TERMINAL_MASK: Self =
        Self::from_bits_truncate(Self::DONE.bits() | Self::PROBLEM.bits());

    /// Bits that indicate the axis cannot be trusted to move.
    pub const FAULT_MASK: Self =
        Self::from_bits_truncate(Self::PROBLEM.bits() | Self::COMM_ERR.bits());

    /// Returns true if the poller should stop tracking the axis.
    ///
    /// A limit switch only ends the move when it is the one in the raw
    /// direction of travel; an axis backing off a switch keeps moving.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        self.intersects(Self::TERMINAL_MASK) || self.limit_in_travel()
    }

    /// Returns true if any fault bit is set.
    #[inline]
    pub const fn has_fault(&self) -> bool {
        self.intersects(Self::FAULT_MASK)
    }

    /// Returns true if the hard limit ahead of the current raw direction
    /// is active.
    #[inline]
    pub const fn limit_in_travel(&self) -> bool {
        if self.contains(Self::DIRECTION) {
            self.contains(Self::PLUS_LS)
        } else {
            self.contains(Self::MINUS_LS)
        }
    }
}

impl Default for StatusBits {
    fn default() -> Self {
        Self::empty()
    }
}

/// One decoded status reply, in raw controller units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisReading {
    /// Motor position in steps.
    pub position: f64,
    /// Encoder position in counts.
    pub encoder_position: f64,
    /// Current velocity in steps/s.
    pub velocity: f64,
    pub status: StatusBits,
}

/// Status delivered from the poller to exactly one supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub axis: AxisId,
    pub raw_position: f64,
    pub raw_encoder_position: f64,
    pub velocity: f64,
    #[serde(with = "status_bits_serde")]
    pub status: StatusBits,
    pub comm_error: bool,
}

impl StatusEvent {
    /// Event built from a successful status read.
    pub fn from_reading(axis: AxisId, reading: AxisReading) -> Self {
        Self {
            axis,
            raw_position: reading.position,
            raw_encoder_position: reading.encoder_position,
            velocity: reading.velocity,
            status: reading.status,
            comm_error: false,
        }
    }

    /// Event reporting that the axis could not be read.
    ///
    /// Position fields carry the last known values so the supervisor's
    /// readback does not jump.
    pub fn comm_fault(axis: AxisId, last: AxisReading) -> Self {
        Self {
            axis,
            raw_position: last.position,
            raw_encoder_position: last.encoder_position,
            velocity: 0.0,
            status: last.status | StatusBits::COMM_ERR | StatusBits::PROBLEM | StatusBits::DONE,
            comm_error: true,
        }
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.status.contains(StatusBits::DONE)
    }
}

mod status_bits_serde {
    use super::StatusBits;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bits: &StatusBits, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(bits.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<StatusBits, D::Error> {
        u32::deserialize(d).map(StatusBits::from_bits_truncate)
    }
}
