//! Error taxonomy shared by the core and the supervisors.

use serde::{Serialize, Serializer};
use thiserror::Error;

use super::types::AxisId;

/// Failure encoding a command, talking to a controller, or decoding a reply.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// No reply arrived within the configured timeout.
    #[error("timed out waiting for controller reply")]
    Timeout,

    /// Reply could not be parsed.
    #[error("malformed controller reply: {0}")]
    Malformed(String),

    /// The vendor has no encoding for this command.
    #[error("command not supported by vendor '{vendor}': {command}")]
    Unsupported { vendor: &'static str, command: String },

    /// Transport-level I/O failure.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Reason a submission to a controller queue was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Not enough free slots for the whole batch.
    #[error("submission queue full ({free} free, {needed} needed)")]
    QueueFull { free: usize, needed: usize },

    /// Controller worker has shut down.
    #[error("controller is closed")]
    Closed,
}

/// Errors surfaced to supervisor callers and through axis snapshots.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionError {
    /// Target outside the soft limits and not heading back into range.
    #[error("soft limit violation: dial target {target} outside [{low}, {high}]")]
    SoftLimitViolation { target: f64, low: f64, high: f64 },

    /// Two consecutive failed status reads, or a command could not be delivered.
    #[error("communication fault on axis {0}")]
    CommError(AxisId),

    /// Retry budget spent without reaching the retry deadband.
    #[error("target missed after {attempts} retries (error {error})")]
    RetryExhausted { attempts: u32, error: f64 },

    /// A parameter was out of range and replaced by a safe value.
    #[error("configuration corrected: {0}")]
    ConfigurationError(String),

    /// A homing, jog or position-load sequence owns the axis.
    #[error("axis {0} is busy")]
    AxisBusy(AxisId),

    /// Home search toward a limit switch that is already active.
    #[error("home blocked: axis {0} is on the limit switch in the search direction")]
    HomeBlocked(AxisId),

    /// The command batch could not be queued.
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] SubmitError),

    #[error("unknown axis {0}")]
    UnknownAxis(AxisId),
}

impl Serialize for MotionError {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}
