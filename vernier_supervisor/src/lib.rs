//! # Vernier Supervisor Library
//!
//! One [`MotionSupervisor`] per axis turns target positions and operator
//! commands into command batches for the concurrency core, and turns the
//! core's status events back into readback, done and limit state.
//!
//! # Module Structure
//!
//! - [`params`] - Per-axis tuning: calibration, speeds, backlash, retries
//! - [`limits`] - Soft travel limits in dial units
//! - [`backlash`] - Preferred-direction approach planning
//! - [`retry`] - Retry deadband and correction scaling
//! - [`profile`] - Velocity / acceleration per leg
//! - [`mode`] - Motion modes and post-stop actions
//! - [`snapshot`] - Published axis state
//! - [`supervisor`] - The per-axis state machine
//! - [`registry`] - Axis lookup, status routing, settle timers
//! - [`config`] - Controllers and axes from TOML
//!
//! # Usage
//!
//! ```rust
//! use vernier_common::prelude::*;
//! use vernier_supervisor::{AxisParams, MotionSupervisor};
//!
//! #[derive(Clone)]
//! struct Discard;
//!
//! impl CommandSink for Discard {
//!     fn submit(&self, _batch: &[CommandRequest]) -> Result<(), SubmitError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut axis = MotionSupervisor::new(AxisId::new(0, 0), "slit_x", AxisParams::default(), Discard);
//! axis.set_target(12.5).unwrap();
//! assert_eq!(axis.target().user, 12.5);
//! ```

pub mod backlash;
pub mod config;
pub mod limits;
pub mod mode;
pub mod params;
pub mod profile;
pub mod registry;
pub mod retry;
pub mod snapshot;
pub mod supervisor;

pub use crate::config::{AxisConfig, ControllerSection, SupervisorConfig};
pub use crate::limits::SoftLimits;
pub use crate::mode::MotionMode;
pub use crate::params::AxisParams;
pub use crate::registry::AxisRegistry;
pub use crate::retry::RetryMode;
pub use crate::snapshot::{AxisFlags, AxisSnapshot};
pub use crate::supervisor::MotionSupervisor;
