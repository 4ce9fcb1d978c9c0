//! # Vernier HAL Library
//!
//! The command/status concurrency core: one worker thread per motion
//! controller that serialises queued commands onto the controller's
//! transport and polls moving axes at an adaptive rate.
//!
//! # Module Structure
//!
//! - [`driver`] - `Transport` / `CommandEncoder` contracts and `HalError`
//! - [`driver_registry`] - Vendor encoder factories
//! - [`config`] - Per-controller connection settings
//! - [`controller`] - Submission queue, poll loop, worker lifecycle
//! - [`drivers`] - Built-in vendors (simulation)
//!
//! # Architecture
//!
//! ```text
//!  supervisors ──submit──► ┌──────────────────────────────┐
//!                          │ Mutex { queue, in_motion }   │
//!                          └──────────────┬───────────────┘
//!                                         │ Condvar
//!                                         ▼
//!                          ┌──────────────────────────────┐
//!                          │ worker: poll moving axes,    │──► Transport
//!                          │ then drain the queue         │◄── (via CommandEncoder)
//!                          └──────────────┬───────────────┘
//!                                         │ mpsc
//!  supervisors ◄──StatusEvent─────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod driver;
pub mod driver_registry;
pub mod drivers;

pub use crate::config::ControllerConfig;
pub use crate::controller::{Controller, ControllerHandle, CoreStats};
pub use crate::driver::{CommandEncoder, EncoderFactory, HalError, Transport};
pub use crate::driver_registry::DriverRegistry;
