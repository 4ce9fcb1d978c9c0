//! Vernier Common Library
//!
//! Shared value types, unit conversion and configuration loading for all
//! vernier workspace crates.
//!
//! # Module Structure
//!
//! - [`motion`] - Axis identifiers, command requests, status events, unit conversion
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Timing and sizing constants shared by the core and supervisors
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use vernier_common::prelude::*;
//!
//! let cal = Calibration::new(0.001, 0.0, Direction::Positive);
//! assert_eq!(cal.dial_to_raw(1.0), 1000);
//! ```

pub mod config;
pub mod consts;
pub mod motion;
pub mod prelude;
