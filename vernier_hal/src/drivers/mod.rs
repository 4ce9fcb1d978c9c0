//! Built-in vendors.
//!
//! - [`simulation`] - In-memory controller for development and testing
//!
//! # Adding a vendor
//!
//! 1. Create a submodule under `drivers/`
//! 2. Implement `CommandEncoder` (and a `Transport` if the link is special)
//! 3. Register its factory in [`register_builtin`]

pub mod simulation;

use tracing::warn;

use crate::driver_registry::DriverRegistry;

/// Register every built-in vendor.
pub fn register_builtin(registry: &mut DriverRegistry) {
    if let Err(e) = registry.register(simulation::VENDOR, simulation::create_encoder) {
        warn!("{e}");
    }
}
