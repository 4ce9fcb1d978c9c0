//! Axis-level value types exchanged between the supervisors and the
//! command/status concurrency core.
//!
//! - [`types`] - `AxisId`, user/dial direction and motion sense
//! - [`command`] - `CommandKind`, `CommandRequest`, message classes
//! - [`status`] - `StatusBits`, `AxisReading`, `StatusEvent`
//! - [`units`] - user / dial / raw conversion
//! - [`error`] - protocol and motion error taxonomy
//! - [`sink`] - the `CommandSink` seam supervisors submit through

pub mod command;
pub mod error;
pub mod sink;
pub mod status;
pub mod types;
pub mod units;
