//! Speed and acceleration for each kind of move, in dial units.

use vernier_common::motion::command::CommandKind;
use vernier_common::motion::types::Sense;
use vernier_common::motion::units::Calibration;

use crate::params::AxisParams;

/// Which part of an approach a positioning move is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Slew,
    /// First leg of a two-leg approach, to the far side of the target.
    Overshoot,
    Backlash,
}

impl Leg {
    /// Share of the remaining distance a relative move covers.
    ///
    /// An overshoot leg must still end past the target, so `frac` can
    /// lengthen it but never shorten it.
    pub fn move_fraction(self, frac: f64) -> f64 {
        match self {
            Leg::Overshoot => frac.max(1.0),
            Leg::Slew | Leg::Backlash => frac,
        }
    }
}

/// Velocity, base velocity and acceleration of one move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    pub velocity: f64,
    pub base_velocity: f64,
    pub accel: f64,
}

/// Acceleration that takes `accel_time` to ramp from `base` to `velocity`.
pub fn accel_for(velocity: f64, base: f64, accel_time: f64) -> f64 {
    let v = velocity.abs();
    if accel_time <= 0.0 {
        return 0.0;
    }
    if v > base { (v - base) / accel_time } else { v / accel_time }
}

impl Profile {
    pub fn for_leg(params: &AxisParams, leg: Leg) -> Self {
        let (velocity, accel_time) = match leg {
            Leg::Slew | Leg::Overshoot => (params.velocity, params.accel_time),
            Leg::Backlash => (params.backlash_velocity, params.backlash_accel_time),
        };
        Self {
            velocity,
            base_velocity: params.base_velocity,
            accel: accel_for(velocity, params.base_velocity, accel_time),
        }
    }

    pub fn home(params: &AxisParams) -> Self {
        Self {
            velocity: params.home_velocity,
            base_velocity: params.base_velocity,
            accel: accel_for(params.home_velocity, params.base_velocity, params.accel_time),
        }
    }

    pub fn jog(params: &AxisParams, velocity: f64) -> Self {
        Self {
            velocity,
            base_velocity: params.base_velocity,
            accel: params.jog_accel,
        }
    }
}

/// Home command for a search in dial `sense`.
pub fn home_command(cal: &Calibration, sense: Sense) -> CommandKind {
    if sense.is_forward() == cal.raw_follows_dial() {
        CommandKind::HomeForward
    } else {
        CommandKind::HomeReverse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vernier_common::motion::types::Direction;

    #[test]
    fn accel_measured_from_base_velocity() {
        assert_eq!(accel_for(10.0, 2.0, 0.5), 16.0);
        assert_eq!(accel_for(-10.0, 2.0, 0.5), 16.0);
        assert_eq!(accel_for(1.0, 2.0, 0.5), 2.0);
        assert_eq!(accel_for(1.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn backlash_leg_uses_backlash_speeds() {
        let params = AxisParams {
            velocity: 4.0,
            accel_time: 0.5,
            backlash_velocity: 1.0,
            backlash_accel_time: 0.25,
            ..AxisParams::default()
        };
        let slew = Profile::for_leg(&params, Leg::Slew);
        assert_eq!(Profile::for_leg(&params, Leg::Overshoot), slew);
        let bl = Profile::for_leg(&params, Leg::Backlash);
        assert_eq!((slew.velocity, slew.accel), (4.0, 8.0));
        assert_eq!((bl.velocity, bl.accel), (1.0, 4.0));
    }

    #[test]
    fn overshoot_is_never_shortened() {
        assert_eq!(Leg::Overshoot.move_fraction(0.5), 1.0);
        assert_eq!(Leg::Overshoot.move_fraction(1.5), 1.5);
        assert_eq!(Leg::Backlash.move_fraction(0.5), 0.5);
        assert_eq!(Leg::Slew.move_fraction(0.5), 0.5);
    }

    #[test]
    fn home_direction_follows_resolution_sign() {
        let pos = Calibration::new(0.01, 0.0, Direction::Positive);
        let neg = Calibration::new(-0.01, 0.0, Direction::Positive);
        assert_eq!(home_command(&pos, Sense::Forward), CommandKind::HomeForward);
        assert_eq!(home_command(&neg, Sense::Forward), CommandKind::HomeReverse);
        assert_eq!(home_command(&neg, Sense::Reverse), CommandKind::HomeForward);
    }
}
