//! Simulated single-axis stage.
//!
//! Positions are in raw steps. The motor moves at the commanded slew
//! velocity; the load (read back as the encoder) follows the motor through
//! a dead zone of `backlash_steps`, so reversing direction leaves the load
//! behind until the slack is taken up.

use std::time::Duration;
use tracing::{debug, trace};
use vernier_common::motion::status::{AxisReading, StatusBits};

use super::SimulationConfig;

/// What the motor is doing.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Activity {
    Idle,
    Moving { target: f64 },
    Jogging { velocity: f64 },
    Homing { velocity: f64 },
}

/// Physics of one simulated axis.
#[derive(Debug, Clone)]
pub struct SimStage {
    motor: f64,
    load: f64,
    activity: Activity,
    /// Target loaded by MA/MR, started by GO.
    pending: Option<f64>,
    velocity: f64,
    base_velocity: f64,
    last_positive: bool,
    homed: bool,
    torque: bool,
    backlash: f64,
    undershoot: f64,
    plus_limit: Option<f64>,
    minus_limit: Option<f64>,
    home: f64,
}

impl SimStage {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            motor: 0.0,
            load: 0.0,
            activity: Activity::Idle,
            pending: None,
            velocity: config.default_velocity,
            base_velocity: 0.0,
            last_positive: true,
            homed: false,
            torque: true,
            backlash: config.backlash_steps,
            undershoot: config.undershoot,
            plus_limit: config.plus_limit_steps,
            minus_limit: config.minus_limit_steps,
            home: config.home_steps,
        }
    }

    // ─── Commands ───────────────────────────────────────────────────

    pub fn load_absolute(&mut self, target: f64) {
        self.pending = Some(target);
    }

    pub fn load_relative(&mut self, distance: f64) {
        self.pending = Some(self.motor + distance);
    }

    /// Start the loaded move, landing short by the configured undershoot.
    pub fn go(&mut self) {
        let Some(target) = self.pending.take() else {
            return;
        };
        let landing = target - (target - self.motor) * self.undershoot;
        self.last_positive = landing >= self.motor;
        self.activity = Activity::Moving { target: landing };
        debug!("sim: move {} -> {}", self.motor, landing);
    }

    pub fn jog(&mut self, velocity: f64) {
        if velocity == 0.0 {
            self.stop();
            return;
        }
        self.last_positive = velocity > 0.0;
        self.activity = Activity::Jogging { velocity };
    }

    pub fn home(&mut self, forward: bool) {
        let speed = self.velocity.abs().max(self.base_velocity);
        self.last_positive = forward;
        self.activity = Activity::Homing {
            velocity: if forward { speed } else { -speed },
        };
    }

    pub fn stop(&mut self) {
        self.activity = Activity::Idle;
        self.pending = None;
    }

    pub fn load_position(&mut self, position: f64) {
        let slack = self.load - self.motor;
        self.motor = position;
        self.load = position + slack;
        self.pending = None;
    }

    pub fn set_velocity(&mut self, velocity: f64) {
        self.velocity = velocity.abs();
    }

    pub fn set_base_velocity(&mut self, velocity: f64) {
        self.base_velocity = velocity.abs();
    }

    pub fn set_torque(&mut self, on: bool) {
        self.torque = on;
        if !on {
            self.stop();
        }
    }

    pub fn set_undershoot(&mut self, undershoot: f64) {
        self.undershoot = undershoot;
    }

    /// Teleport motor and load, as if pushed by hand.
    pub fn place(&mut self, position: f64) {
        self.motor = position;
        self.load = position;
    }

    pub fn is_moving(&self) -> bool {
        self.activity != Activity::Idle
    }

    pub fn motor_position(&self) -> f64 {
        self.motor
    }

    pub fn load_position_steps(&self) -> f64 {
        self.load
    }

    // ─── Physics ────────────────────────────────────────────────────

    /// Advance the stage by `dt`.
    pub fn update(&mut self, dt: Duration) {
        let dt_s = dt.as_secs_f64();
        match self.activity {
            Activity::Idle => {}
            Activity::Moving { target } => {
                let step = self.velocity.max(self.base_velocity) * dt_s;
                let error = target - self.motor;
                if error.abs() <= step {
                    self.motor = target;
                    self.activity = Activity::Idle;
                } else {
                    self.motor += step.copysign(error);
                }
            }
            Activity::Jogging { velocity } => {
                self.motor += velocity * dt_s;
            }
            Activity::Homing { velocity } => {
                let next = self.motor + velocity * dt_s;
                let crossed = (self.motor - self.home) * (next - self.home) <= 0.0;
                if crossed {
                    self.motor = self.home;
                    self.homed = true;
                    self.activity = Activity::Idle;
                } else {
                    self.motor = next;
                }
            }
        }
        self.enforce_limits();
        self.follow_load();
        trace!("sim: motor={} load={} {:?}", self.motor, self.load, self.activity);
    }

    fn enforce_limits(&mut self) {
        if let Some(plus) = self.plus_limit {
            if self.motor >= plus {
                self.motor = plus;
                if self.last_positive {
                    self.activity = Activity::Idle;
                }
            }
        }
        if let Some(minus) = self.minus_limit {
            if self.motor <= minus {
                self.motor = minus;
                if !self.last_positive {
                    self.activity = Activity::Idle;
                }
            }
        }
    }

    fn follow_load(&mut self) {
        let half = self.backlash / 2.0;
        if self.motor - self.load > half {
            self.load = self.motor - half;
        } else if self.load - self.motor > half {
            self.load = self.motor + half;
        }
    }

    // ─── Status ─────────────────────────────────────────────────────

    pub fn reading(&self) -> AxisReading {
        let mut status = StatusBits::ENCODER_PRESENT;
        if self.is_moving() {
            status |= StatusBits::MOVING;
        } else {
            status |= StatusBits::DONE;
        }
        if self.last_positive {
            status |= StatusBits::DIRECTION;
        }
        if self.plus_limit.is_some_and(|p| self.motor >= p) {
            status |= StatusBits::PLUS_LS;
        }
        if self.minus_limit.is_some_and(|m| self.motor <= m) {
            status |= StatusBits::MINUS_LS;
        }
        if (self.motor - self.home).abs() < 0.5 {
            status |= StatusBits::HOME | StatusBits::ENCODER_HOME;
        }
        if self.homed {
            status |= StatusBits::HOMED;
        }
        if !self.torque {
            status |= StatusBits::PROBLEM;
        }

        let velocity = match self.activity {
            Activity::Idle => 0.0,
            Activity::Moving { target } => self.velocity.copysign(target - self.motor),
            Activity::Jogging { velocity } | Activity::Homing { velocity } => velocity,
        };

        AxisReading {
            position: self.motor.round(),
            encoder_position: self.load.round(),
            velocity,
            status,
        }
    }
}
