//! Prelude module for common re-exports.
//!
//! ```rust
//! use vernier_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_STALE_DELAY_MS, QUEUE_CAPACITY};

// ─── Axis types ─────────────────────────────────────────────────────
pub use crate::motion::command::{CommandKind, CommandRequest, FollowUp, MessageClass};
pub use crate::motion::error::{MotionError, ProtocolError, SubmitError};
pub use crate::motion::sink::CommandSink;
pub use crate::motion::status::{AxisReading, StatusBits, StatusEvent};
pub use crate::motion::types::{AxisId, Direction, Sense};
pub use crate::motion::units::{Calibration, Position, nint};
