//! Retry policy applied when an axis stops short of its target.

use serde::{Deserialize, Serialize};

/// How successive correction moves are scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryMode {
    /// Every correction covers the full remaining error.
    #[default]
    Linear,
    /// Corrections shrink by `(max - count + 1) / max`.
    Arithmetic,
    /// Corrections halve on every retry.
    Geometric,
    /// No correction move; wait for the settling delay and look again.
    InPosition,
}

impl RetryMode {
    /// Scale factor for correction number `count` (1-based) out of `max`.
    ///
    /// `None` for [`RetryMode::InPosition`], which never issues a move.
    pub fn scale(self, count: u32, max: u32) -> Option<f64> {
        match self {
            Self::Linear => Some(1.0),
            Self::Arithmetic if max > 0 => {
                Some((f64::from(max) - f64::from(count) + 1.0) / f64::from(max))
            }
            Self::Arithmetic => Some(1.0),
            Self::Geometric => Some(0.5f64.powi(count.saturating_sub(1) as i32)),
            Self::InPosition => None,
        }
    }
}

/// Outcome of judging a stopped axis against its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Within the retry deadband, or blocked by a limit switch.
    Done,
    /// Out of deadband but retries are disabled.
    Abandon,
    /// Issue correction number `count`.
    Retry { count: u32 },
    /// Out of budget after `attempts` corrections.
    Exhausted { attempts: u32, error: f64 },
}

/// Judge the position error `diff` (target minus readback, dial units).
///
/// `count` is the number of corrections already issued for this target.
pub fn evaluate(diff: f64, deadband: f64, blocked: bool, count: u32, max: u32) -> Verdict {
    if diff.abs() < deadband || blocked {
        return Verdict::Done;
    }
    if max == 0 {
        return Verdict::Abandon;
    }
    let next = count + 1;
    if next > max {
        Verdict::Exhausted {
            attempts: count,
            error: diff,
        }
    } else {
        Verdict::Retry { count: next }
    }
}
