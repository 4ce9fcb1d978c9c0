//! Timing and sizing constants.

use static_assertions::const_assert;

/// Default poll rate of the motion poller while any axis is moving.
pub const DEFAULT_POLL_RATE_HZ: u32 = 6;

/// Fastest poll rate a controller may be configured for.
pub const MAX_POLL_RATE_HZ: u32 = 60;

/// Default poll interval derived from [`DEFAULT_POLL_RATE_HZ`].
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000 / DEFAULT_POLL_RATE_HZ as u64;

/// Minimum poll interval derived from [`MAX_POLL_RATE_HZ`].
pub const MIN_POLL_INTERVAL_MS: u64 = 1000 / MAX_POLL_RATE_HZ as u64;

/// Default delay before the first status poll after a move or jog is sent.
///
/// Two scheduler ticks at the maximum poll rate.
pub const DEFAULT_STALE_DELAY_MS: u64 = 2 * MIN_POLL_INTERVAL_MS;

/// Lower bound for the stale-data delay (one scheduler quantum).
pub const MIN_STALE_DELAY_MS: u64 = 1;

/// Default time to wait for a controller reply.
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 500;

/// Capacity of the per-controller submission queue.
pub const QUEUE_CAPACITY: usize = 64;

/// Maximum number of axes served by one controller connection.
pub const MAX_AXES_PER_CONTROLLER: usize = 32;

/// Consecutive failed status reads before an axis is reported in comm fault.
pub const COMM_FAULT_THRESHOLD: u32 = 2;

/// Default accel/decel time in seconds used when none is configured.
pub const DEFAULT_ACCEL_TIME_S: f64 = 0.1;

const_assert!(DEFAULT_STALE_DELAY_MS >= MIN_STALE_DELAY_MS);
const_assert!(QUEUE_CAPACITY >= MAX_AXES_PER_CONTROLLER);
const_assert!(COMM_FAULT_THRESHOLD >= 2);
