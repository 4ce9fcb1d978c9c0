//! Top-level configuration: controllers and the axes wired to them.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! service_name = "vernier"
//!
//! [[controllers]]
//! name = "sim0"
//! vendor = "simulation"
//! poll_interval_ms = 50
//!
//! [[controllers.axes]]
//! name = "slit_x"
//! channel = 0
//! resolution = 0.001
//! backlash_distance = -0.01
//! retry_max = 3
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use vernier_common::config::{ConfigError, ConfigLoader, SharedConfig};
use vernier_common::consts::MAX_AXES_PER_CONTROLLER;
use vernier_common::motion::types::AxisId;
use vernier_hal::config::ControllerConfig;
use vernier_hal::driver_registry::DriverRegistry;

use crate::params::AxisParams;

/// One axis on a controller.
#[derive(Debug, Clone, Deserialize)]
pub struct AxisConfig {
    pub name: String,
    pub channel: u8,
    #[serde(flatten)]
    pub params: AxisParams,
}

/// One controller and its axes.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerSection {
    #[serde(flatten)]
    pub link: ControllerConfig,
    #[serde(default)]
    pub axes: Vec<AxisConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    pub shared: SharedConfig,
    pub controllers: Vec<ControllerSection>,
}

impl ConfigLoader for SupervisorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        if self.controllers.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one [[controllers]] entry is required".to_string(),
            ));
        }
        if self.controllers.len() > usize::from(u16::MAX) {
            return Err(ConfigError::ValidationError(
                "too many controllers".to_string(),
            ));
        }

        let mut controller_names = HashSet::new();
        let mut axis_names = HashSet::new();
        for section in &self.controllers {
            section.link.validate()?;
            if !controller_names.insert(section.link.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate controller name '{}'",
                    section.link.name
                )));
            }

            let mut channels = HashSet::new();
            for axis in &section.axes {
                if axis.name.trim().is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "controller '{}': axis name cannot be empty",
                        section.link.name
                    )));
                }
                if !axis_names.insert(axis.name.as_str()) {
                    return Err(ConfigError::ValidationError(format!(
                        "duplicate axis name '{}'",
                        axis.name
                    )));
                }
                if usize::from(axis.channel) >= MAX_AXES_PER_CONTROLLER {
                    return Err(ConfigError::ValidationError(format!(
                        "axis '{}': channel {} exceeds maximum {}",
                        axis.name,
                        axis.channel,
                        MAX_AXES_PER_CONTROLLER - 1
                    )));
                }
                if !channels.insert(axis.channel) {
                    return Err(ConfigError::ValidationError(format!(
                        "controller '{}': channel {} used twice",
                        section.link.name, axis.channel
                    )));
                }
            }
        }
        Ok(())
    }
}

impl SupervisorConfig {
    /// Check every controller's vendor against `registry`.
    pub fn check_vendors(&self, registry: &DriverRegistry) -> Result<(), ConfigError> {
        for section in &self.controllers {
            if !registry.contains(&section.link.vendor) {
                return Err(ConfigError::ValidationError(format!(
                    "controller '{}': unknown vendor '{}' (available: {})",
                    section.link.name,
                    section.link.vendor,
                    registry.vendors().join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Every configured axis with its id, in file order.
    pub fn axes(&self) -> impl Iterator<Item = (AxisId, &AxisConfig)> {
        self.controllers
            .iter()
            .enumerate()
            .flat_map(|(index, section)| {
                section
                    .axes
                    .iter()
                    .map(move |axis| (AxisId::new(index as u16, axis.channel), axis))
            })
    }
}
