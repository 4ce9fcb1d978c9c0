//! Axis parameters and their sanitising.
//!
//! All distances and speeds are dial units (per second); times are seconds.
//! [`AxisParams::sanitize`] corrects out-of-range values in place and
//! reports each correction as `MotionError::ConfigurationError`.

use serde::{Deserialize, Serialize};
use tracing::warn;
use vernier_common::consts::DEFAULT_ACCEL_TIME_S;
use vernier_common::motion::error::MotionError;
use vernier_common::motion::types::Direction;
use vernier_common::motion::units::Calibration;

use crate::retry::RetryMode;

/// Range accepted for `frac`.
pub const FRAC_RANGE: (f64, f64) = (0.1, 1.5);

/// Smallest new-target-monitor factor.
pub const MIN_NTM_FACTOR: f64 = 2.0;

fn default_one() -> f64 {
    1.0
}

fn default_accel_time() -> f64 {
    0.2
}

fn default_backlash_accel_time() -> f64 {
    0.5
}

fn default_retry_max() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_ntm_factor() -> f64 {
    MIN_NTM_FACTOR
}

/// Everything `configure` accepts for one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisParams {
    // ── Calibration ──
    /// Motor resolution, dial units per step.
    #[serde(default = "default_one")]
    pub resolution: f64,
    /// Encoder resolution, dial units per count (0 = same as motor).
    pub encoder_resolution: f64,
    pub offset: f64,
    pub direction: Direction,

    // ── Speeds ──
    #[serde(default = "default_one")]
    pub velocity: f64,
    pub base_velocity: f64,
    /// Upper speed clamp (0 = none).
    pub max_velocity: f64,
    /// Time to reach `velocity` from `base_velocity`.
    #[serde(default = "default_accel_time")]
    pub accel_time: f64,

    // ── Backlash ──
    /// Signed final-approach distance; its sign is the preferred direction.
    pub backlash_distance: f64,
    #[serde(default = "default_one")]
    pub backlash_velocity: f64,
    #[serde(default = "default_backlash_accel_time")]
    pub backlash_accel_time: f64,
    /// Fraction of the remaining error taken by each relative correction.
    #[serde(default = "default_one")]
    pub frac: f64,

    // ── Retries ──
    pub retry_deadband: f64,
    /// Smallest move worth sending (0 = retry deadband).
    pub setpoint_deadband: f64,
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,
    pub retry_mode: RetryMode,
    /// Read position from the encoder rather than the motor.
    pub use_encoder: bool,
    /// Readback comes from an external link; enables relative corrections.
    pub follow_readback_link: bool,
    /// Seconds to wait after motion stops before judging the position.
    pub settle_delay: f64,

    // ── Jog / home ──
    pub jog_velocity: f64,
    pub jog_accel: f64,
    pub home_velocity: f64,
    /// Step used by `tweak`.
    #[serde(default = "default_one")]
    pub tweak_step: f64,

    // ── New-target monitor ──
    #[serde(default = "default_true")]
    pub ntm: bool,
    #[serde(default = "default_ntm_factor")]
    pub ntm_factor: f64,

    // ── Soft limits, user units ──
    pub low_limit: f64,
    pub high_limit: f64,
    #[serde(default = "default_true")]
    pub limits_enabled: bool,
}

impl Default for AxisParams {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            encoder_resolution: 0.0,
            offset: 0.0,
            direction: Direction::Positive,
            velocity: 1.0,
            base_velocity: 0.0,
            max_velocity: 0.0,
            accel_time: default_accel_time(),
            backlash_distance: 0.0,
            backlash_velocity: 1.0,
            backlash_accel_time: default_backlash_accel_time(),
            frac: 1.0,
            retry_deadband: 0.0,
            setpoint_deadband: 0.0,
            retry_max: default_retry_max(),
            retry_mode: RetryMode::Linear,
            use_encoder: false,
            follow_readback_link: false,
            settle_delay: 0.0,
            jog_velocity: 0.0,
            jog_accel: 0.0,
            home_velocity: 0.0,
            tweak_step: 1.0,
            ntm: true,
            ntm_factor: MIN_NTM_FACTOR,
            low_limit: 0.0,
            high_limit: 0.0,
            limits_enabled: true,
        }
    }
}

impl AxisParams {
    /// Calibration derived from these parameters.
    pub fn calibration(&self) -> Calibration {
        Calibration {
            resolution: self.resolution,
            encoder_resolution: self.encoder_resolution,
            offset: self.offset,
            direction: self.direction,
        }
    }

    /// True when corrections are sent as relative moves.
    pub fn relative_positioning(&self) -> bool {
        self.retry_max != 0
            && self.retry_mode != RetryMode::InPosition
            && (self.use_encoder || self.follow_readback_link)
    }

    /// Backlash leg runs at slew speed and acceleration.
    pub fn backlash_matches_slew(&self) -> bool {
        self.backlash_velocity == self.velocity && self.backlash_accel_time == self.accel_time
    }

    /// Correct out-of-range values in place.
    ///
    /// Returns one `ConfigurationError` per correction, in the order applied.
    pub fn sanitize(&mut self) -> Vec<MotionError> {
        let mut fixes = Fixes::default();

        // Resolution
        if self.resolution == 0.0 || !self.resolution.is_finite() {
            fixes.note(format!("resolution {} replaced by 1.0", self.resolution));
            self.resolution = 1.0;
        }
        if self.encoder_resolution == 0.0 || !self.encoder_resolution.is_finite() {
            self.encoder_resolution = self.resolution;
        }

        // Speeds
        if self.max_velocity < 0.0 {
            fixes.note(format!("max_velocity {} replaced by 0", self.max_velocity));
            self.max_velocity = 0.0;
        }
        if self.base_velocity < 0.0 {
            fixes.note(format!("base_velocity {} replaced by 0", self.base_velocity));
            self.base_velocity = 0.0;
        }
        if self.max_velocity > 0.0 && self.base_velocity > self.max_velocity {
            fixes.note(format!(
                "base_velocity {} clamped to max_velocity {}",
                self.base_velocity, self.max_velocity
            ));
            self.base_velocity = self.max_velocity;
        }
        if self.velocity <= 0.0 {
            fixes.note(format!("velocity {} replaced by 1.0", self.velocity));
            self.velocity = 1.0;
        }
        if self.backlash_velocity <= 0.0 {
            self.backlash_velocity = self.velocity;
        }
        if self.jog_velocity == 0.0 {
            self.jog_velocity = self.velocity;
        }
        if self.home_velocity == 0.0 {
            self.home_velocity = self.velocity;
        }
        let (lo, hi) = (self.base_velocity, self.max_velocity);
        for (name, speed) in [
            ("velocity", &mut self.velocity),
            ("backlash_velocity", &mut self.backlash_velocity),
            ("jog_velocity", &mut self.jog_velocity),
            ("home_velocity", &mut self.home_velocity),
        ] {
            let clamped = clamp_speed(speed.abs(), lo, hi);
            if clamped != *speed {
                fixes.note(format!("{name} {speed} clamped to {clamped}"));
                *speed = clamped;
            }
        }

        // Accelerations
        if self.accel_time <= 0.0 {
            fixes.note(format!(
                "accel_time {} replaced by {DEFAULT_ACCEL_TIME_S}",
                self.accel_time
            ));
            self.accel_time = DEFAULT_ACCEL_TIME_S;
        }
        if self.backlash_accel_time <= 0.0 {
            fixes.note(format!(
                "backlash_accel_time {} replaced by {DEFAULT_ACCEL_TIME_S}",
                self.backlash_accel_time
            ));
            self.backlash_accel_time = DEFAULT_ACCEL_TIME_S;
        }
        if self.jog_accel <= 0.0 {
            self.jog_accel = self.velocity / self.accel_time;
        }

        // Deadbands
        let min_deadband = self.resolution.abs();
        if self.retry_deadband < min_deadband {
            if self.retry_deadband != 0.0 {
                fixes.note(format!(
                    "retry_deadband {} raised to resolution {min_deadband}",
                    self.retry_deadband
                ));
            }
            self.retry_deadband = min_deadband;
        }
        if self.setpoint_deadband <= 0.0 {
            self.setpoint_deadband = self.retry_deadband;
        } else if self.setpoint_deadband > self.retry_deadband {
            fixes.note(format!(
                "setpoint_deadband {} clamped to retry_deadband {}",
                self.setpoint_deadband, self.retry_deadband
            ));
            self.setpoint_deadband = self.retry_deadband;
        }

        // Correction tuning
        let (frac_lo, frac_hi) = FRAC_RANGE;
        if !self.frac.is_finite() {
            fixes.note(format!("frac {} replaced by 1.0", self.frac));
            self.frac = 1.0;
        } else if !(frac_lo..=frac_hi).contains(&self.frac) {
            let clamped = self.frac.clamp(frac_lo, frac_hi);
            fixes.note(format!("frac {} clamped to {clamped}", self.frac));
            self.frac = clamped;
        }
        if self.ntm_factor.is_nan() || self.ntm_factor < MIN_NTM_FACTOR {
            fixes.note(format!(
                "ntm_factor {} raised to {MIN_NTM_FACTOR}",
                self.ntm_factor
            ));
            self.ntm_factor = MIN_NTM_FACTOR;
        }
        if !self.settle_delay.is_finite() || self.settle_delay < 0.0 {
            fixes.note(format!("settle_delay {} replaced by 0", self.settle_delay));
            self.settle_delay = 0.0;
        }

        fixes.0
    }
}

fn clamp_speed(speed: f64, base: f64, max: f64) -> f64 {
    let floored = speed.max(base);
    if max > 0.0 { floored.min(max) } else { floored }
}

#[derive(Default)]
struct Fixes(Vec<MotionError>);

impl Fixes {
    fn note(&mut self, what: String) {
        warn!("Parameter corrected: {what}");
        self.0.push(MotionError::ConfigurationError(what));
    }
}
