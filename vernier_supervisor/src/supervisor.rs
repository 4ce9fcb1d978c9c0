//! Per-axis motion supervisor.
//!
//! Decides what to send next for one axis given its target, the last
//! status event, the soft limits and the backlash/retry policy. It owns no
//! thread: callers drive it with target changes and explicit commands,
//! the registry feeds it status events and settle timers. Every command
//! leaves through the [`CommandSink`] as one batch per decision.
//!
//! ## Positioning
//!
//! 1. A new target within the retry deadband of the readback is a no-op.
//! 2. Soft limits are checked (at the overshoot point for moves against
//!    the backlash direction); a violation restores the previous target.
//! 3. The move is planned by [`backlash::plan`] and sent as
//!    `SetVelocity, SetBaseVelocity, [SetAcceleration], Move*, Go`.
//! 4. When the axis stops, a pending backlash leg is sent; otherwise the
//!    position is judged by [`retry::evaluate`] (after the settle delay).

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use vernier_common::motion::command::{CommandKind, CommandRequest};
use vernier_common::motion::error::MotionError;
use vernier_common::motion::sink::CommandSink;
use vernier_common::motion::status::{StatusBits, StatusEvent};
use vernier_common::motion::types::{AxisId, Direction, Sense};
use vernier_common::motion::units::{Calibration, Position, nint};

use crate::backlash::{self, Approach, Plan};
use crate::limits::SoftLimits;
use crate::mode::{AfterStop, MotionMode};
use crate::params::AxisParams;
use crate::profile::{self, Leg, Profile};
use crate::retry::{self, Verdict};
use crate::snapshot::{AxisFlags, AxisSnapshot};

// ─── Supervisor ─────────────────────────────────────────────────────

/// State machine for one axis.
pub struct MotionSupervisor<S: CommandSink> {
    axis: AxisId,
    name: String,
    params: AxisParams,
    cal: Calibration,
    sink: S,

    // ── Positions ──
    target: Position,
    /// Target at the time the last move was issued.
    last_target: Position,
    /// Dial position the last move was sent to.
    commanded_dial: f64,
    readback: Position,
    encoder_raw: f64,

    // ── Sequencing ──
    mode: MotionMode,
    after_stop: AfterStop,
    stop_requested: bool,
    backlash_pending: bool,
    /// Jog held by the operator (user sense).
    jog_requested: Option<Sense>,
    /// Jog speed magnitude, dial units/s.
    jog_speed: f64,
    paused: bool,
    /// Settle timer expired and the fresh status read was requested.
    settle_acked: bool,
    retry_count: u32,
    /// Last move was commanded toward increasing raw position.
    raw_up: bool,
    external_motion: bool,
    initialized: bool,
    fault_latched: bool,

    // ── Status ──
    limits: SoftLimits,
    flags: AxisFlags,
    raw_plus_ls: bool,
    raw_minus_ls: bool,
    target_rejected: bool,
    last_error: Option<MotionError>,

    subscribers: Vec<Sender<AxisSnapshot>>,
    last_published: Option<AxisSnapshot>,
}

impl<S: CommandSink> MotionSupervisor<S> {
    /// Supervisor for `axis`, commands going to `sink`.
    ///
    /// Parameters are sanitised first; the last correction, if any, is
    /// reported as `last_error`.
    pub fn new(axis: AxisId, name: impl Into<String>, mut params: AxisParams, sink: S) -> Self {
        let fixes = params.sanitize();
        let cal = params.calibration();
        let (low, high) = cal.user_limits_to_dial(params.low_limit, params.high_limit);
        let limits = SoftLimits::new(low, high, params.limits_enabled);
        let origin = Position::from_dial(&cal, 0.0);

        Self {
            axis,
            name: name.into(),
            jog_speed: params.jog_velocity,
            params,
            cal,
            sink,
            target: origin,
            last_target: origin,
            commanded_dial: 0.0,
            readback: origin,
            encoder_raw: 0.0,
            mode: MotionMode::Idle,
            after_stop: AfterStop::Sync,
            stop_requested: false,
            backlash_pending: false,
            jog_requested: None,
            paused: false,
            settle_acked: false,
            retry_count: 0,
            raw_up: true,
            external_motion: false,
            initialized: false,
            fault_latched: false,
            limits,
            flags: AxisFlags {
                done: true,
                ..AxisFlags::default()
            },
            raw_plus_ls: false,
            raw_minus_ls: false,
            target_rejected: false,
            last_error: fixes.into_iter().last(),
            subscribers: Vec::new(),
            last_published: None,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn axis(&self) -> AxisId {
        self.axis
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> MotionMode {
        self.mode
    }

    pub fn params(&self) -> &AxisParams {
        &self.params
    }

    pub fn calibration(&self) -> &Calibration {
        &self.cal
    }

    pub fn target(&self) -> Position {
        self.target
    }

    pub fn readback(&self) -> Position {
        self.readback
    }

    /// Dial position the last move was sent to.
    pub fn commanded_dial(&self) -> f64 {
        self.commanded_dial
    }

    /// Last encoder reading, raw counts.
    pub fn encoder_raw(&self) -> f64 {
        self.encoder_raw
    }

    pub fn limits(&self) -> SoftLimits {
        self.limits
    }

    pub fn flags(&self) -> AxisFlags {
        self.flags
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<&MotionError> {
        self.last_error.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.flags.done
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn snapshot(&self) -> AxisSnapshot {
        AxisSnapshot {
            name: self.name.clone(),
            axis: self.axis,
            mode: self.mode,
            readback_user: self.readback.user,
            readback_dial: self.readback.dial,
            readback_raw: self.readback.raw,
            target_user: self.target.user,
            target_dial: self.target.dial,
            target_raw: self.target.raw,
            retry_count: self.retry_count,
            flags: self.flags,
            last_error: self.last_error.clone(),
        }
    }

    /// Receive a snapshot every time the published state changes.
    pub fn subscribe(&mut self) -> Receiver<AxisSnapshot> {
        let (tx, rx) = mpsc::channel();
        // Current state first, so a late subscriber is not left empty.
        let snap = self.snapshot();
        if tx.send(snap.clone()).is_ok() {
            self.subscribers.push(tx);
            self.last_published = Some(snap);
        }
        rx
    }

    // ─── Caller commands ────────────────────────────────────────────

    /// Move to `user` (user units).
    pub fn set_target(&mut self, user: f64) -> Result<(), MotionError> {
        let result = self.accept_target(user);
        self.publish();
        result
    }

    /// Move by `delta` user units from the current target.
    pub fn move_relative(&mut self, delta: f64) -> Result<(), MotionError> {
        self.set_target(self.target.user + delta)
    }

    /// Step the target by the tweak step in user `sense`.
    pub fn tweak(&mut self, sense: Sense) -> Result<(), MotionError> {
        let step = self.params.tweak_step.abs();
        let delta = if sense.is_forward() { step } else { -step };
        self.move_relative(delta)
    }

    /// Start (or retarget) a jog in user `sense`.
    ///
    /// `velocity` overrides the configured jog velocity (dial units/s).
    pub fn jog(&mut self, sense: Sense, velocity: Option<f64>) -> Result<(), MotionError> {
        let result = self.request_jog(sense, velocity);
        self.publish();
        result
    }

    /// Operator let go of the jog: stop, then take up backlash.
    pub fn jog_release(&mut self) -> Result<(), MotionError> {
        self.jog_requested = None;
        let result = match self.mode {
            MotionMode::Jogging { sense } => {
                debug!("{}: jog released", self.axis);
                self.stop_then(AfterStop::JogBacklash { sense })
            }
            MotionMode::Stopping if matches!(self.after_stop, AfterStop::Jog { .. }) => {
                self.after_stop = AfterStop::Sync;
                Ok(())
            }
            _ => Ok(()),
        };
        self.publish();
        result
    }

    /// Home search in dial `sense`.
    pub fn home(&mut self, sense: Sense) -> Result<(), MotionError> {
        let result = self.request_home(sense);
        self.publish();
        result
    }

    /// Stop the axis. Always sends `Stop`; at rest the target is synced to
    /// the readback so nothing resumes later.
    pub fn stop(&mut self) -> Result<(), MotionError> {
        self.jog_requested = None;
        self.paused = false;
        let result = if self.at_rest() {
            debug!("{}: stop at rest, target synced", self.axis);
            let sent = self.submit(&[self.bare(CommandKind::Stop)]);
            self.sync_target();
            self.finish();
            sent
        } else {
            self.stop_then(AfterStop::Sync)
        };
        self.publish();
        result
    }

    /// Stop but keep the target; [`go`](Self::go) resumes.
    pub fn pause(&mut self) -> Result<(), MotionError> {
        self.paused = true;
        self.jog_requested = None;
        let result = if self.at_rest() {
            self.mode = MotionMode::Idle;
            self.submit(&[self.bare(CommandKind::Stop)])
        } else {
            self.stop_then(AfterStop::Hold)
        };
        debug!("{}: paused", self.axis);
        self.publish();
        result
    }

    /// Resume after [`pause`](Self::pause).
    pub fn go(&mut self) -> Result<(), MotionError> {
        if !self.paused {
            return Ok(());
        }
        self.paused = false;
        debug!("{}: go", self.axis);
        let result = match self.mode {
            MotionMode::Stopping => {
                self.after_stop = AfterStop::NewTarget;
                Ok(())
            }
            MotionMode::Idle if !self.flags.moving => self.begin_move(false),
            _ => Ok(()),
        };
        self.publish();
        result
    }

    /// Replace the soft limits (user units).
    pub fn set_limits(&mut self, low: f64, high: f64, enabled: bool) {
        self.params.low_limit = low;
        self.params.high_limit = high;
        self.params.limits_enabled = enabled;
        let (dlow, dhigh) = self.cal.user_limits_to_dial(low, high);
        self.limits = SoftLimits::new(dlow, dhigh, enabled);
        debug!("{}: soft limits dial [{dlow}, {dhigh}] enabled={enabled}", self.axis);
        self.refresh_limit_flag();
        self.publish();
    }

    /// Apply new parameters, returning the corrections made to them.
    ///
    /// A resolution change while at rest reloads the controller's raw
    /// position so the dial position is kept.
    pub fn configure(&mut self, mut params: AxisParams) -> Vec<MotionError> {
        let fixes = params.sanitize();
        let resolution_changed = params.resolution != self.params.resolution;

        self.params = params;
        self.cal = self.params.calibration();
        let (low, high) = self
            .cal
            .user_limits_to_dial(self.params.low_limit, self.params.high_limit);
        self.limits = SoftLimits::new(low, high, self.params.limits_enabled);
        self.jog_speed = self.params.jog_velocity;

        self.target = Position::from_dial(&self.cal, self.target.dial);
        self.last_target = Position::from_dial(&self.cal, self.last_target.dial);
        self.readback = Position::from_dial(&self.cal, self.readback.dial);

        if resolution_changed && self.initialized && self.at_rest() && !self.fault_latched {
            let raw = self.cal.dial_to_raw(self.readback.dial) as f64;
            info!("{}: resolution changed, reloading raw position {raw}", self.axis);
            let batch = [
                self.req(CommandKind::LoadPosition, raw),
                self.bare(CommandKind::GetInfo),
            ];
            if self.submit(&batch).is_ok() {
                self.mode = MotionMode::LoadingPosition;
                self.flags.done = false;
            }
        }
        if let Some(last) = fixes.last() {
            self.record(last.clone());
        }
        self.refresh_limit_flag();
        self.publish();
        fixes
    }

    /// Write a new raw position to the controller so the readback becomes
    /// `user`, without moving.
    pub fn load_position(&mut self, user: f64) -> Result<(), MotionError> {
        self.ensure_usable()?;
        if !self.at_rest() {
            return Err(MotionError::AxisBusy(self.axis));
        }
        let dial = self.cal.user_to_dial(user);
        let raw = self.cal.dial_to_raw(dial) as f64;
        let batch = [
            self.req(CommandKind::LoadPosition, raw),
            self.bare(CommandKind::GetInfo),
        ];
        self.submit(&batch)?;
        self.target = Position::from_dial(&self.cal, dial);
        self.last_target = self.target;
        self.mode = MotionMode::LoadingPosition;
        self.flags.done = false;
        debug!("{}: loading raw position {raw}", self.axis);
        self.publish();
        Ok(())
    }

    /// Change the user offset so the current readback reads `user`.
    ///
    /// Dial limits stay put; the user limits move with the offset.
    pub fn redefine_position(&mut self, user: f64) -> Result<(), MotionError> {
        if !self.at_rest() {
            return Err(MotionError::AxisBusy(self.axis));
        }
        let offset = user - self.params.direction.sign() * self.readback.dial;
        self.params.offset = offset;
        self.cal.offset = offset;
        let (low, high) = self.cal.dial_limits_to_user(self.limits.low, self.limits.high);
        self.params.low_limit = low;
        self.params.high_limit = high;
        self.readback = Position::from_dial(&self.cal, self.readback.dial);
        self.sync_target();
        debug!("{}: offset now {offset}", self.axis);
        self.publish();
        Ok(())
    }

    pub fn enable_torque(&mut self, on: bool) -> Result<(), MotionError> {
        let kind = if on {
            CommandKind::EnableTorque
        } else {
            CommandKind::DisableTorque
        };
        let result = self.submit(&[self.bare(kind), self.bare(CommandKind::GetInfo)]);
        self.publish();
        result
    }

    /// Ask the controller for a fresh status event.
    pub fn refresh(&mut self) -> Result<(), MotionError> {
        self.submit(&[self.bare(CommandKind::GetInfo)])
    }

    /// Clear a latched communication fault and request fresh status.
    pub fn reset_fault(&mut self) -> Result<(), MotionError> {
        if self.fault_latched {
            info!("{}: communication fault cleared", self.axis);
        }
        self.fault_latched = false;
        self.flags.comm_error = false;
        self.last_error = None;
        let result = self.submit(&[self.bare(CommandKind::GetInfo)]);
        self.publish();
        result
    }

    // ─── Status events ──────────────────────────────────────────────

    /// Consume one status event for this axis.
    pub fn handle_status(&mut self, event: &StatusEvent) {
        if event.axis != self.axis {
            warn!("{}: ignoring status for {}", self.axis, event.axis);
            return;
        }
        trace!(
            "{}: status raw={} enc={} bits={:?}",
            self.axis, event.raw_position, event.raw_encoder_position, event.status
        );

        if event.comm_error {
            self.apply_readback(event);
            self.comm_fault();
        } else {
            self.apply_readback(event);
            if !self.initialized {
                self.initialized = true;
                if self.mode == MotionMode::Idle && !self.flags.moving {
                    self.sync_target();
                }
            }
            if !self.fault_latched {
                if self.flags.moving {
                    self.on_moving();
                } else {
                    self.on_stopped();
                }
            }
        }
        self.publish();
    }

    /// Fire the settle timer if it has expired by `now`.
    pub fn tick(&mut self, now: Instant) {
        if let MotionMode::SettlingDelay { until } = self.mode {
            if !self.settle_acked && now >= until {
                self.settle_acked = true;
                trace!("{}: settle delay over", self.axis);
                if self.submit(&[self.bare(CommandKind::GetInfo)]).is_err() {
                    self.evaluate();
                    self.publish();
                }
            }
        }
    }

    /// When [`tick`](Self::tick) next needs to run.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.mode {
            MotionMode::SettlingDelay { until } if !self.settle_acked => Some(until),
            _ => None,
        }
    }

    fn apply_readback(&mut self, event: &StatusEvent) {
        let status = event.status;
        let dial = if self.params.use_encoder && status.contains(StatusBits::ENCODER_PRESENT) {
            self.cal.encoder_to_dial(event.raw_encoder_position)
        } else {
            self.cal.raw_to_dial(event.raw_position)
        };
        self.readback = Position::from_dial(&self.cal, dial);
        self.encoder_raw = event.raw_encoder_position;

        if self.mode == MotionMode::Idle {
            self.raw_up = status.contains(StatusBits::DIRECTION);
        }
        self.raw_plus_ls = status.contains(StatusBits::PLUS_LS);
        self.raw_minus_ls = status.contains(StatusBits::MINUS_LS);
        let (high, low) = if self.cal.raw_follows_user() {
            (self.raw_plus_ls, self.raw_minus_ls)
        } else {
            (self.raw_minus_ls, self.raw_plus_ls)
        };
        self.flags.high_limit = high;
        self.flags.low_limit = low;

        let done = status.contains(StatusBits::DONE);
        let ls_active = self.limit_in_travel_direction();
        self.flags.moving = !done && !ls_active;
        self.flags.at_home = if self.params.use_encoder {
            status.contains(StatusBits::ENCODER_HOME)
        } else {
            status.intersects(StatusBits::HOME | StatusBits::ENCODER_HOME)
        };
        self.flags.homed = status.contains(StatusBits::HOMED);
        self.flags.problem = status.contains(StatusBits::PROBLEM);
        self.refresh_limit_flag();

        if ls_active && !done && !self.stop_requested {
            warn!("{}: limit switch hit, stopping", self.axis);
            // Left unset on refusal so the next event asks again.
            self.stop_requested = self.submit(&[self.bare(CommandKind::Stop)]).is_ok();
        }
    }

    fn comm_fault(&mut self) {
        warn!("{}: communication fault, automatic motion halted", self.axis);
        self.fault_latched = true;
        self.flags.comm_error = true;
        self.flags.problem = true;
        self.flags.moving = false;
        self.jog_requested = None;
        self.record(MotionError::CommError(self.axis));
        self.finish();
    }

    fn on_moving(&mut self) {
        self.flags.done = false;
        match self.mode {
            MotionMode::Idle => {
                if !self.external_motion {
                    debug!("{}: external motion", self.axis);
                }
                self.external_motion = true;
            }
            MotionMode::Jogging { sense } => {
                let forward = self.dial_forward(sense);
                if !self.stop_requested
                    && self
                        .limits
                        .jog_overrun(self.readback.dial, self.jog_speed, forward)
                {
                    warn!("{}: jog reached soft limit", self.axis);
                    self.target_rejected = true;
                    self.refresh_limit_flag();
                    self.jog_requested = None;
                    self.safety_stop(AfterStop::Sync);
                }
            }
            mode if mode.is_positioning() => self.new_target_monitor(),
            _ => {}
        }
    }

    /// Stop a move that is heading away from a changed target.
    fn new_target_monitor(&mut self) {
        if !self.params.ntm || self.stop_requested {
            return;
        }
        let diff = self.target.dial - self.readback.dial;
        let toward_raw_up = self.cal.dial_to_raw(diff) >= 0;
        let deadband =
            self.params.ntm_factor * (self.params.backlash_distance.abs() + self.params.retry_deadband);
        if toward_raw_up != self.raw_up && diff.abs() > deadband {
            debug!(
                "{}: target now behind the move (error {diff}), stopping to retarget",
                self.axis
            );
            self.backlash_pending = false;
            self.safety_stop(AfterStop::NewTarget);
        }
    }

    fn on_stopped(&mut self) {
        match self.mode {
            MotionMode::Idle => {
                if self.external_motion {
                    debug!("{}: external motion ended", self.axis);
                    self.external_motion = false;
                    self.sync_target();
                }
                if !self.paused {
                    self.flags.done = true;
                }
            }
            MotionMode::SettlingDelay { .. } => {
                if self.settle_acked {
                    self.settle_acked = false;
                    self.evaluate();
                }
            }
            MotionMode::LoadingPosition | MotionMode::Jogging { .. } | MotionMode::Homing { .. } => {
                debug!("{}: {} complete", self.axis, self.mode.name());
                self.sync_target();
                self.finish();
            }
            MotionMode::Stopping => self.after_stopped(),
            MotionMode::MovingToTarget | MotionMode::MovingBacklash | MotionMode::Retrying => {
                self.on_move_stopped();
            }
        }
    }

    fn on_move_stopped(&mut self) {
        if self.limit_in_travel_direction() {
            warn!("{}: move ended on limit switch", self.axis);
            self.finish();
            return;
        }
        if self.target.dial != self.last_target.dial {
            debug!("{}: target changed during move", self.axis);
            self.backlash_pending = false;
            self.mode = MotionMode::Idle;
            let _ = self.begin_move(false);
            return;
        }
        if self.backlash_pending {
            self.backlash_pending = false;
            debug!("{}: final backlash leg to {}", self.axis, self.target.dial);
            if self.move_dial(Leg::Backlash, self.target.dial).is_ok() {
                self.mode = MotionMode::MovingBacklash;
            }
            return;
        }
        if self.params.settle_delay > 0.0 {
            self.start_settling();
        } else {
            self.evaluate();
        }
    }

    fn after_stopped(&mut self) {
        let next = std::mem::take(&mut self.after_stop);
        self.stop_requested = false;
        self.mode = MotionMode::Idle;
        debug!("{}: stopped, next {next:?}", self.axis);
        match next {
            AfterStop::Sync => {
                self.sync_target();
                self.finish();
            }
            AfterStop::Hold => self.finish(),
            AfterStop::NewTarget => {
                if self.paused {
                    self.finish();
                } else {
                    let _ = self.begin_move(false);
                }
            }
            AfterStop::Jog { sense } => {
                if self.jog_requested == Some(sense) {
                    let _ = self.start_jog(sense);
                } else {
                    self.sync_target();
                    self.finish();
                }
            }
            AfterStop::JogBacklash { sense } => self.jog_backlash(sense),
            AfterStop::Home { sense } => {
                if self.start_home(sense).is_err() {
                    self.sync_target();
                    self.finish();
                }
            }
        }
    }

    // ─── Positioning ────────────────────────────────────────────────

    fn accept_target(&mut self, user: f64) -> Result<(), MotionError> {
        self.ensure_usable()?;
        if self.mode.owns_axis() {
            return Err(MotionError::AxisBusy(self.axis));
        }
        let previous = self.target;
        let target = Position::from_user(&self.cal, user);
        let backlash = self.params.backlash_distance;
        let preferred = backlash::is_preferred(target.dial, self.readback.dial, backlash);
        if let Err(e) = self
            .limits
            .check_move(target.dial, previous.dial, preferred, backlash)
        {
            warn!("{}: target {user} rejected: {e}", self.axis);
            self.target_rejected = true;
            self.refresh_limit_flag();
            self.record(e.clone());
            return Err(e);
        }
        self.target = target;
        self.target_rejected = false;
        self.refresh_limit_flag();
        debug!("{}: target {user} (dial {})", self.axis, target.dial);

        if self.paused {
            return Ok(());
        }
        match self.mode {
            MotionMode::Stopping => {
                if !matches!(self.after_stop, AfterStop::Hold) {
                    self.after_stop = AfterStop::NewTarget;
                }
                Ok(())
            }
            mode if mode.is_positioning() => {
                self.flags.done = false;
                Ok(())
            }
            MotionMode::SettlingDelay { .. } => {
                self.settle_acked = false;
                self.mode = MotionMode::Idle;
                self.begin_move(false)
            }
            _ if self.flags.moving => self.stop_then(AfterStop::NewTarget),
            _ => self.begin_move(false),
        }
    }

    /// Plan and send a move toward the current target.
    fn begin_move(&mut self, retry: bool) -> Result<(), MotionError> {
        let diff = self.target.dial - self.readback.dial;
        if !retry {
            if diff.abs() < self.params.retry_deadband {
                trace!("{}: already within deadband", self.axis);
                self.last_target = self.target;
                self.flags.missed = false;
                self.finish();
                return Ok(());
            }
            self.retry_count = 0;
        }
        self.flags.missed = false;

        let backlash = self.params.backlash_distance;
        let preferred = backlash::is_preferred(self.target.dial, self.readback.dial, backlash);
        let previous = self.last_target;
        if let Err(e) = self
            .limits
            .check_move(self.target.dial, previous.dial, preferred, backlash)
        {
            warn!("{}: move rejected: {e}", self.axis);
            self.target = previous;
            self.target_rejected = true;
            self.refresh_limit_flag();
            self.record(e.clone());
            self.finish();
            return Err(e);
        }

        let mut scale = 1.0;
        if retry {
            match self
                .params
                .retry_mode
                .scale(self.retry_count, self.params.retry_max)
            {
                Some(factor) => scale = factor,
                None => {
                    self.last_target = self.target;
                    self.start_settling();
                    return Ok(());
                }
            }
        }
        let relative = diff * scale;
        let relative_backlash = (self.target.dial - backlash - self.readback.dial) * scale;
        self.retry_or_done(retry, relative, relative_backlash)
    }

    fn retry_or_done(
        &mut self,
        retry: bool,
        relative: f64,
        relative_backlash: f64,
    ) -> Result<(), MotionError> {
        let floor = self.params.setpoint_deadband;
        let at_least = |d: f64| if d.abs() < floor { floor.copysign(d) } else { d };

        self.last_target = self.target;
        let plan = backlash::plan(&Approach {
            target: self.target.dial,
            readback: self.readback.dial,
            relative: at_least(relative),
            relative_backlash: at_least(relative_backlash),
            backlash: self.params.backlash_distance,
            resolution: self.params.resolution,
            setpoint_deadband: floor,
            speeds_match: self.params.backlash_matches_slew(),
        });
        debug!("{}: {plan:?} (retry {})", self.axis, self.retry_count);

        let moving = if retry {
            MotionMode::Retrying
        } else {
            MotionMode::MovingToTarget
        };
        let (leg, mode, pending) = match plan {
            Plan::Direct { .. } => (Leg::Slew, moving, false),
            Plan::FinalLeg { .. } => (Leg::Backlash, MotionMode::MovingBacklash, false),
            Plan::TwoLeg { .. } => (Leg::Overshoot, moving, true),
        };
        self.move_dial(leg, plan.dial())?;
        self.mode = mode;
        self.backlash_pending = pending;
        Ok(())
    }

    /// Send one positioning move to dial `position`.
    fn move_dial(&mut self, leg: Leg, position: f64) -> Result<(), MotionError> {
        let profile = Profile::for_leg(&self.params, leg);
        let diff = position - self.readback.dial;
        let motion = if self.params.relative_positioning() {
            let steps = nint(diff * leg.move_fraction(self.params.frac) / self.cal.resolution);
            self.req(CommandKind::MoveRelative, steps as f64)
        } else {
            let steps = self.cal.dial_to_raw(position);
            self.req(CommandKind::MoveAbsolute, steps as f64)
        };

        let mut batch = self.profile_commands(&profile);
        batch.push(motion);
        batch.push(self.bare(CommandKind::Go));

        self.commanded_dial = position;
        self.raw_up = (position >= self.readback.dial) == self.cal.raw_follows_dial();
        self.flags.done = false;
        self.stop_requested = false;
        if let Err(e) = self.submit(&batch) {
            self.finish();
            return Err(e);
        }
        Ok(())
    }

    fn evaluate(&mut self) {
        let diff = self.target.dial - self.readback.dial;
        let user_diff = diff * self.params.direction.sign();
        let blocked =
            (user_diff > 0.0 && self.flags.high_limit) || (user_diff < 0.0 && self.flags.low_limit);
        match retry::evaluate(
            diff,
            self.params.retry_deadband,
            blocked,
            self.retry_count,
            self.params.retry_max,
        ) {
            Verdict::Done => {
                self.flags.missed = false;
                debug!("{}: in position at {}", self.axis, self.readback.user);
                self.finish();
            }
            Verdict::Abandon => {
                debug!("{}: off by {diff}, retries disabled", self.axis);
                self.finish();
            }
            Verdict::Retry { count } => {
                debug!("{}: off by {diff}, retry {count}", self.axis);
                self.retry_count = count;
                self.mode = MotionMode::Retrying;
                let _ = self.begin_move(true);
            }
            Verdict::Exhausted { attempts, error } => {
                warn!("{}: target missed after {attempts} retries", self.axis);
                self.flags.missed = true;
                self.record(MotionError::RetryExhausted { attempts, error });
                self.finish();
            }
        }
    }

    fn start_settling(&mut self) {
        let delay = Duration::try_from_secs_f64(self.params.settle_delay).unwrap_or(Duration::ZERO);
        self.mode = MotionMode::SettlingDelay {
            until: Instant::now() + delay,
        };
        self.flags.done = false;
        self.settle_acked = false;
        if delay.is_zero() {
            self.settle_acked = true;
            if self.submit(&[self.bare(CommandKind::GetInfo)]).is_err() {
                self.finish();
            }
        }
    }

    // ─── Jog / home ─────────────────────────────────────────────────

    fn request_jog(&mut self, sense: Sense, velocity: Option<f64>) -> Result<(), MotionError> {
        self.ensure_usable()?;
        let speed = velocity.map_or(self.params.jog_velocity, f64::abs);
        let speed = if self.params.max_velocity > 0.0 {
            speed.min(self.params.max_velocity)
        } else {
            speed
        };
        let speed = speed.max(self.params.base_velocity);
        self.jog_requested = Some(sense);
        self.paused = false;

        match self.mode {
            MotionMode::Jogging { sense: current } if current == sense => {
                if speed != self.jog_speed {
                    self.jog_speed = speed;
                    let raw = self.signed_jog_speed(sense);
                    return self.submit(&[self.req(CommandKind::JogVelocity, raw)]);
                }
                Ok(())
            }
            MotionMode::Homing { .. } | MotionMode::LoadingPosition => {
                self.jog_requested = None;
                Err(MotionError::AxisBusy(self.axis))
            }
            _ => {
                self.jog_speed = speed;
                if self.at_rest() {
                    self.settle_acked = false;
                    self.mode = MotionMode::Idle;
                    self.start_jog(sense)
                } else {
                    self.stop_then(AfterStop::Jog { sense })
                }
            }
        }
    }

    fn start_jog(&mut self, sense: Sense) -> Result<(), MotionError> {
        let forward = self.dial_forward(sense);
        if self
            .limits
            .jog_overrun(self.readback.dial, self.jog_speed, forward)
        {
            let e = MotionError::SoftLimitViolation {
                target: self.readback.dial,
                low: self.limits.low,
                high: self.limits.high,
            };
            warn!("{}: jog refused: {e}", self.axis);
            self.jog_requested = None;
            self.target_rejected = true;
            self.refresh_limit_flag();
            self.record(e.clone());
            self.finish();
            return Err(e);
        }

        let profile = Profile::jog(&self.params, self.jog_speed);
        let mut batch = Vec::with_capacity(2);
        if profile.accel > 0.0 {
            batch.push(self.req(
                CommandKind::SetAcceleration,
                self.cal.speed_to_raw(profile.accel),
            ));
        }
        batch.push(self.req(CommandKind::Jog, self.signed_jog_speed(sense)));

        self.raw_up = forward == self.cal.raw_follows_dial();
        self.retry_count = 0;
        self.flags.missed = false;
        self.flags.done = false;
        self.stop_requested = false;
        if let Err(e) = self.submit(&batch) {
            self.jog_requested = None;
            self.finish();
            return Err(e);
        }
        self.mode = MotionMode::Jogging { sense };
        debug!("{}: jogging {sense:?} at {}", self.axis, self.jog_speed);
        Ok(())
    }

    /// After a jog stops, approach the stop point from the backlash side.
    fn jog_backlash(&mut self, sense: Sense) {
        self.sync_target();
        let backlash = self.params.backlash_distance;
        let forward = self.dial_forward(sense);
        let preferred = backlash == 0.0 || (backlash > 0.0) == forward;
        if backlash.abs() < self.params.resolution.abs()
            || (preferred && self.params.backlash_matches_slew())
        {
            self.finish();
            return;
        }
        self.retry_count = 0;
        self.last_target = self.target;
        let overshoot = self.target.dial - backlash;
        debug!("{}: jog backlash via {overshoot}", self.axis);
        if self.move_dial(Leg::Overshoot, overshoot).is_ok() {
            self.mode = MotionMode::MovingToTarget;
            self.backlash_pending = true;
        }
    }

    fn request_home(&mut self, sense: Sense) -> Result<(), MotionError> {
        self.ensure_usable()?;
        if self.mode == MotionMode::LoadingPosition {
            return Err(MotionError::AxisBusy(self.axis));
        }
        if self.mode == (MotionMode::Homing { sense }) {
            return Ok(());
        }
        let raw_forward = sense.is_forward() == self.cal.raw_follows_dial();
        let blocked = if raw_forward {
            self.raw_plus_ls
        } else {
            self.raw_minus_ls
        };
        if blocked {
            let e = MotionError::HomeBlocked(self.axis);
            warn!("{}: {e}", self.axis);
            self.record(e.clone());
            return Err(e);
        }
        self.jog_requested = None;
        self.paused = false;
        if self.at_rest() {
            self.mode = MotionMode::Idle;
            self.start_home(sense)
        } else {
            self.stop_then(AfterStop::Home { sense })
        }
    }

    fn start_home(&mut self, sense: Sense) -> Result<(), MotionError> {
        let profile = Profile::home(&self.params);
        let mut batch = self.profile_commands(&profile);
        batch.push(self.bare(profile::home_command(&self.cal, sense)));

        self.raw_up = sense.is_forward() == self.cal.raw_follows_dial();
        self.retry_count = 0;
        self.flags.missed = false;
        self.flags.done = false;
        self.stop_requested = false;
        if let Err(e) = self.submit(&batch) {
            self.finish();
            return Err(e);
        }
        self.mode = MotionMode::Homing { sense };
        info!("{}: homing {sense:?}", self.axis);
        Ok(())
    }

    // ─── Helpers ────────────────────────────────────────────────────

    fn req(&self, kind: CommandKind, param: f64) -> CommandRequest {
        CommandRequest::new(self.axis, kind, param)
    }

    fn bare(&self, kind: CommandKind) -> CommandRequest {
        CommandRequest::bare(self.axis, kind)
    }

    fn profile_commands(&self, profile: &Profile) -> Vec<CommandRequest> {
        let mut batch = Vec::with_capacity(5);
        batch.push(self.req(
            CommandKind::SetVelocity,
            self.cal.speed_to_raw(profile.velocity),
        ));
        batch.push(self.req(
            CommandKind::SetBaseVelocity,
            self.cal.speed_to_raw(profile.base_velocity),
        ));
        if profile.accel > 0.0 {
            batch.push(self.req(
                CommandKind::SetAcceleration,
                self.cal.speed_to_raw(profile.accel),
            ));
        }
        batch
    }

    fn signed_jog_speed(&self, sense: Sense) -> f64 {
        let raw = self.cal.speed_to_raw(self.jog_speed);
        if self.dial_forward(sense) == self.cal.raw_follows_dial() {
            raw
        } else {
            -raw
        }
    }

    /// User `sense` as positive dial travel.
    fn dial_forward(&self, sense: Sense) -> bool {
        sense.is_forward() == (self.params.direction == Direction::Positive)
    }

    fn submit(&mut self, batch: &[CommandRequest]) -> Result<(), MotionError> {
        match self.sink.submit(batch) {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = MotionError::Dispatch(e);
                warn!("{}: {err}", self.axis);
                self.record(err.clone());
                Err(err)
            }
        }
    }

    fn stop_then(&mut self, next: AfterStop) -> Result<(), MotionError> {
        self.after_stop = next;
        self.backlash_pending = false;
        if self.mode == MotionMode::Stopping {
            return Ok(());
        }
        self.mode = MotionMode::Stopping;
        self.stop_requested = true;
        self.flags.done = false;
        self.submit(&[self.bare(CommandKind::Stop)])
    }

    /// Stop raised by the supervisor itself. A refused stop leaves the
    /// current mode in place so the next moving event raises it again.
    fn safety_stop(&mut self, next: AfterStop) {
        let mode = self.mode;
        if self.stop_then(next).is_err() {
            self.mode = mode;
            self.stop_requested = false;
            self.after_stop = AfterStop::Sync;
        }
    }

    fn at_rest(&self) -> bool {
        !self.flags.moving
            && matches!(
                self.mode,
                MotionMode::Idle | MotionMode::SettlingDelay { .. }
            )
    }

    fn ensure_usable(&self) -> Result<(), MotionError> {
        if self.fault_latched {
            Err(MotionError::CommError(self.axis))
        } else {
            Ok(())
        }
    }

    fn limit_in_travel_direction(&self) -> bool {
        (self.raw_up && self.raw_plus_ls) || (!self.raw_up && self.raw_minus_ls)
    }

    fn sync_target(&mut self) {
        self.target = self.readback;
        self.last_target = self.readback;
        self.commanded_dial = self.readback.dial;
    }

    fn finish(&mut self) {
        if self.mode != MotionMode::Idle {
            debug!("{}: {} -> idle", self.axis, self.mode.name());
        }
        self.mode = MotionMode::Idle;
        self.flags.done = true;
        self.stop_requested = false;
        self.backlash_pending = false;
        self.settle_acked = false;
        self.after_stop = AfterStop::Sync;
        self.jog_requested = None;
    }

    fn refresh_limit_flag(&mut self) {
        let margin = self.params.retry_deadband;
        let outside = self.limits.active()
            && (self.readback.dial > self.limits.high + margin
                || self.readback.dial < self.limits.low - margin);
        self.flags.soft_limit_violation = self.target_rejected || outside;
    }

    fn record(&mut self, error: MotionError) {
        self.last_error = Some(error);
    }

    fn publish(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        let snap = self.snapshot();
        if self.last_published.as_ref() == Some(&snap) {
            return;
        }
        self.subscribers.retain(|tx| tx.send(snap.clone()).is_ok());
        self.last_published = Some(snap);
    }
}
