//! Simulated motion controller.
//!
//! A [`SimBench`] holds one [`stage::SimStage`] per channel and speaks the
//! ASCII protocol in [`encoder`] over an in-memory [`SimTransport`].

pub mod encoder;
pub mod stage;
pub mod transport;

use serde::{Deserialize, Serialize};
use vernier_common::config::ConfigError;
use vernier_common::consts::MAX_AXES_PER_CONTROLLER;

use crate::driver::{CommandEncoder, Transport};

pub use encoder::{SimEncoder, VENDOR};
pub use transport::{SimBench, SimTransport};

fn default_axes() -> usize {
    8
}

fn default_velocity() -> f64 {
    1000.0
}

/// Simulated stage parameters (all in raw steps).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of channels on the simulated controller.
    #[serde(default = "default_axes")]
    pub axes: usize,

    /// Dead zone between motor and load.
    #[serde(default)]
    pub backlash_steps: f64,

    /// Fraction of every move left unfinished (0 = exact).
    #[serde(default)]
    pub undershoot: f64,

    #[serde(default)]
    pub plus_limit_steps: Option<f64>,

    #[serde(default)]
    pub minus_limit_steps: Option<f64>,

    /// Where a home search ends.
    #[serde(default)]
    pub home_steps: f64,

    /// Slew velocity until a `SetVelocity` arrives, steps/s.
    #[serde(default = "default_velocity")]
    pub default_velocity: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            axes: default_axes(),
            backlash_steps: 0.0,
            undershoot: 0.0,
            plus_limit_steps: None,
            minus_limit_steps: None,
            home_steps: 0.0,
            default_velocity: default_velocity(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axes == 0 || self.axes > MAX_AXES_PER_CONTROLLER {
            return Err(ConfigError::ValidationError(format!(
                "simulation.axes must be 1..={MAX_AXES_PER_CONTROLLER}, got {}",
                self.axes
            )));
        }
        if self.backlash_steps < 0.0 {
            return Err(ConfigError::ValidationError(
                "simulation.backlash_steps must be >= 0".to_string(),
            ));
        }
        if !(0.0..0.9).contains(&self.undershoot) {
            return Err(ConfigError::ValidationError(
                "simulation.undershoot must be in [0, 0.9)".to_string(),
            ));
        }
        if let (Some(plus), Some(minus)) = (self.plus_limit_steps, self.minus_limit_steps) {
            if minus >= plus {
                return Err(ConfigError::ValidationError(
                    "simulation.minus_limit_steps must be below plus_limit_steps".to_string(),
                ));
            }
        }
        if self.default_velocity <= 0.0 {
            return Err(ConfigError::ValidationError(
                "simulation.default_velocity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Factory registered under [`VENDOR`].
pub fn create_encoder() -> Box<dyn CommandEncoder> {
    Box::new(SimEncoder)
}

/// Encoder and transport for a fresh bench, ready for `Controller::spawn`.
pub fn pair(config: &SimulationConfig) -> (Box<dyn CommandEncoder>, Box<dyn Transport>) {
    let bench = SimBench::new(config);
    (create_encoder(), Box::new(bench.transport()))
}
