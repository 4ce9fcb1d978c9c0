//! Backlash approach planning.
//!
//! A target is always approached in the direction given by the sign of the
//! backlash distance. Moves already heading that way go straight in (or as
//! a single backlash-speed leg when close); moves the other way first
//! overshoot to `target - backlash` at slew speed, then come back.

/// How the next move is split into legs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Plan {
    /// One move at slew speed to `dial`.
    Direct { dial: f64 },
    /// One move at backlash speed to `dial`.
    FinalLeg { dial: f64 },
    /// Slew to `dial`; the final leg follows once the axis stops.
    TwoLeg { dial: f64 },
}

impl Plan {
    pub fn dial(&self) -> f64 {
        match *self {
            Self::Direct { dial } | Self::FinalLeg { dial } | Self::TwoLeg { dial } => dial,
        }
    }
}

/// Inputs to [`plan`], all in dial units.
#[derive(Debug, Clone, Copy)]
pub struct Approach {
    pub target: f64,
    pub readback: f64,
    /// Distance still to go (possibly scaled for a retry).
    pub relative: f64,
    /// Distance to the overshoot point `target - backlash` (same scaling).
    pub relative_backlash: f64,
    pub backlash: f64,
    pub resolution: f64,
    pub setpoint_deadband: f64,
    /// Backlash leg runs at slew speed and acceleration.
    pub speeds_match: bool,
}

/// True when travel from `from` toward `to` is in the backlash direction.
///
/// Zero backlash makes every direction preferred.
pub fn is_preferred(to: f64, from: f64, backlash: f64) -> bool {
    backlash == 0.0 || ((to - from) > 0.0) == (backlash > 0.0)
}

/// Decide the legs of the next move.
pub fn plan(a: &Approach) -> Plan {
    let preferred = is_preferred(a.target, a.readback, a.backlash);
    let within_range = (a.target - a.readback).abs() <= a.backlash.abs() + a.setpoint_deadband;

    if a.backlash.abs() < a.resolution.abs() || (preferred && a.speeds_match) {
        Plan::Direct {
            dial: a.readback + a.relative,
        }
    } else if preferred && within_range {
        Plan::FinalLeg {
            dial: a.readback + a.relative,
        }
    } else {
        Plan::TwoLeg {
            dial: a.readback + a.relative_backlash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approach(target: f64, readback: f64, backlash: f64) -> Approach {
        Approach {
            target,
            readback,
            relative: target - readback,
            relative_backlash: target - backlash - readback,
            backlash,
            resolution: 0.001,
            setpoint_deadband: 0.001,
            speeds_match: false,
        }
    }

    #[test]
    fn preferred_follows_backlash_sign() {
        assert!(is_preferred(1.0, 0.0, 0.5));
        assert!(!is_preferred(-1.0, 0.0, 0.5));
        assert!(is_preferred(-1.0, 0.0, -0.5));
        assert!(is_preferred(-1.0, 0.0, 0.0));
    }

    #[test]
    fn no_backlash_is_direct() {
        let p = plan(&approach(10.0, 0.0, 0.0));
        assert_eq!(p, Plan::Direct { dial: 10.0 });
    }

    #[test]
    fn non_preferred_overshoots() {
        // backlash -0.01 prefers negative travel; a positive move overshoots.
        let p = plan(&approach(5.0, 0.0, -0.01));
        assert!(matches!(p, Plan::TwoLeg { dial } if (dial - 5.01).abs() < 1e-12));
    }

    #[test]
    fn far_preferred_move_still_takes_two_legs() {
        let p = plan(&approach(-5.0, 0.0, -0.01));
        assert!(matches!(p, Plan::TwoLeg { dial } if (dial + 4.99).abs() < 1e-12));
    }

    #[test]
    fn near_preferred_move_is_single_backlash_leg() {
        let p = plan(&approach(-0.005, 0.0, -0.01));
        assert_eq!(p, Plan::FinalLeg { dial: -0.005 });
    }

    #[test]
    fn matching_speeds_skip_the_split() {
        let mut a = approach(-5.0, 0.0, -0.01);
        a.speeds_match = true;
        assert_eq!(plan(&a), Plan::Direct { dial: -5.0 });
    }
}
