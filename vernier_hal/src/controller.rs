//! Per-controller command queue and status poller.
//!
//! One [`Controller`] owns one transport. Supervisors submit command batches
//! through a cloneable [`ControllerHandle`]; a single worker thread sends
//! them in submission order and polls every axis that is in motion.
//!
//! # Poll cadence
//!
//! | Axes in motion | Worker wait                                  |
//! |----------------|----------------------------------------------|
//! | none           | until a submission signals the condvar       |
//! | one or more    | `max(0, poll_interval - since_last_wake)`    |
//!
//! After a move or jog is sent the axis is not polled until
//! `stale_delay` has elapsed, so the controller has time to report the new
//! motion instead of the old "done".
//!
//! # Locking
//!
//! The queue and the in-motion set live behind one mutex. Every access takes
//! the lock briefly; it is never held across a transport call.

use heapless::Deque;
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use vernier_common::consts::{COMM_FAULT_THRESHOLD, QUEUE_CAPACITY};
use vernier_common::motion::command::{CommandKind, CommandRequest, FollowUp, MessageClass};
use vernier_common::motion::error::{ProtocolError, SubmitError};
use vernier_common::motion::sink::CommandSink;
use vernier_common::motion::status::{AxisReading, StatusBits, StatusEvent};
use vernier_common::motion::types::AxisId;

use crate::config::ControllerConfig;
use crate::driver::{CommandEncoder, HalError, Transport};

/// How long the worker waits before its next wake-up.
///
/// `None` means "until signalled".
pub fn next_wait(any_moving: bool, poll_interval: Duration, elapsed: Duration) -> Option<Duration> {
    if any_moving {
        Some(poll_interval.saturating_sub(elapsed))
    } else {
        None
    }
}

// ─── Shared state ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct InMotion {
    /// When the last motion or setup command for the axis went out.
    since: Instant,
    follow_up: Option<FollowUp>,
}

struct SharedState {
    queue: Deque<CommandRequest, QUEUE_CAPACITY>,
    in_motion: BTreeMap<AxisId, InMotion>,
    signaled: bool,
    running: bool,
}

struct Shared {
    state: Mutex<SharedState>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable submission side of a controller.
#[derive(Clone)]
pub struct ControllerHandle {
    name: Arc<str>,
    shared: Arc<Shared>,
}

impl ControllerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a batch of requests as one transaction.
    ///
    /// Either every request is queued, in order, or none is.
    ///
    /// # Errors
    /// - `SubmitError::QueueFull` if the batch does not fit
    /// - `SubmitError::Closed` after shutdown
    pub fn submit(&self, batch: &[CommandRequest]) -> Result<(), SubmitError> {
        if batch.is_empty() {
            return Ok(());
        }
        {
            let mut st = self.shared.lock();
            if !st.running {
                return Err(SubmitError::Closed);
            }
            let free = st.queue.capacity() - st.queue.len();
            if free < batch.len() {
                return Err(SubmitError::QueueFull {
                    free,
                    needed: batch.len(),
                });
            }
            for req in batch {
                if st.queue.push_back(*req).is_err() {
                    return Err(SubmitError::QueueFull { free: 0, needed: 1 });
                }
            }
            st.signaled = true;
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Axes the worker currently tracks as moving, in id order.
    pub fn moving_axes(&self) -> Vec<AxisId> {
        self.shared.lock().in_motion.keys().copied().collect()
    }

    /// Requests waiting to be sent.
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }
}

impl CommandSink for ControllerHandle {
    fn submit(&self, batch: &[CommandRequest]) -> Result<(), SubmitError> {
        ControllerHandle::submit(self, batch)
    }
}

// ─── Statistics ─────────────────────────────────────────────────────

/// Worker counters, returned on shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreStats {
    /// Worker wake-ups.
    pub cycles: u64,
    /// Status reads, including those answering `GetInfo`.
    pub status_reads: u64,
    /// Commands written to the transport.
    pub commands_sent: u64,
    /// Commands that failed to encode or send.
    pub command_failures: u64,
    /// Failed status reads.
    pub read_failures: u64,
    /// Events handed to the supervisors.
    pub events: u64,
}

// ─── Controller ─────────────────────────────────────────────────────

/// Owner of one controller worker thread.
///
/// Dropping the controller stops and joins the worker.
pub struct Controller {
    handle: ControllerHandle,
    worker: Option<JoinHandle<CoreStats>>,
}

impl Controller {
    /// Connect the encoder and start the worker.
    ///
    /// Status events for every axis on this controller are sent to `events`.
    ///
    /// # Errors
    /// - `HalError::ConfigError` if `config` does not validate
    /// - `HalError::Protocol` if the encoder's connect sequence fails
    /// - `HalError::SpawnFailed` if the thread cannot be created
    pub fn spawn(
        config: &ControllerConfig,
        mut encoder: Box<dyn CommandEncoder>,
        mut transport: Box<dyn Transport>,
        events: Sender<StatusEvent>,
    ) -> Result<Self, HalError> {
        config
            .validate()
            .map_err(|e| HalError::ConfigError(e.to_string()))?;

        encoder.connect(transport.as_mut())?;

        let shared = Arc::new(Shared {
            state: Mutex::new(SharedState {
                queue: Deque::new(),
                in_motion: BTreeMap::new(),
                signaled: false,
                running: true,
            }),
            wake: Condvar::new(),
        });
        let handle = ControllerHandle {
            name: Arc::from(config.name.as_str()),
            shared: Arc::clone(&shared),
        };

        let worker = Worker {
            name: config.name.clone(),
            encoder,
            transport,
            shared,
            events,
            poll_interval: config.poll_interval(),
            stale_delay: config.stale_delay(),
            reply_timeout: config.reply_timeout(),
            health: HashMap::new(),
            stats: CoreStats::default(),
        };

        info!(
            "Controller '{}' starting: vendor={} poll={}ms stale={}ms",
            config.name, config.vendor, config.poll_interval_ms, config.stale_delay_ms
        );

        let join = thread::Builder::new()
            .name(format!("vernier-{}", config.name))
            .spawn(move || worker.run())
            .map_err(|e| HalError::SpawnFailed(e.to_string()))?;

        Ok(Self {
            handle,
            worker: Some(join),
        })
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Commands still queued are discarded.
    pub fn shutdown(mut self) -> Result<CoreStats, HalError> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<CoreStats, HalError> {
        {
            let mut st = self.handle.shared.lock();
            st.running = false;
        }
        self.handle.shared.wake.notify_all();
        match self.worker.take() {
            Some(join) => join
                .join()
                .map_err(|_| HalError::WorkerPanicked(self.handle.name.to_string())),
            None => Ok(CoreStats::default()),
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop_and_join() {
                warn!("{e}");
            }
        }
    }
}

// ─── Worker ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct AxisHealth {
    consecutive_failures: u32,
    last: AxisReading,
}

struct Worker {
    name: String,
    encoder: Box<dyn CommandEncoder>,
    transport: Box<dyn Transport>,
    shared: Arc<Shared>,
    events: Sender<StatusEvent>,
    poll_interval: Duration,
    stale_delay: Duration,
    reply_timeout: Duration,
    health: HashMap<AxisId, AxisHealth>,
    stats: CoreStats,
}

impl Worker {
    fn run(mut self) -> CoreStats {
        debug!("Controller '{}' worker running", self.name);
        let mut last_wake = Instant::now();

        while self.wait(last_wake) {
            last_wake = Instant::now();
            self.stats.cycles += 1;

            self.poll_moving();
            self.drain_queue();

            if self.stats.cycles % 1000 == 0 {
                debug!(
                    "Controller '{}': cycles={} reads={} sent={} read_failures={} command_failures={}",
                    self.name,
                    self.stats.cycles,
                    self.stats.status_reads,
                    self.stats.commands_sent,
                    self.stats.read_failures,
                    self.stats.command_failures
                );
            }
        }

        info!(
            "Controller '{}' stopped after {} cycles ({} commands, {} read failures)",
            self.name, self.stats.cycles, self.stats.commands_sent, self.stats.read_failures
        );
        self.stats
    }

    /// Block until there is work. Returns false on shutdown.
    fn wait(&self, last_wake: Instant) -> bool {
        let mut st = self.shared.lock();
        loop {
            if !st.running {
                return false;
            }
            if st.signaled {
                st.signaled = false;
                return true;
            }
            match next_wait(
                !st.in_motion.is_empty(),
                self.poll_interval,
                last_wake.elapsed(),
            ) {
                None => {
                    st = self
                        .shared
                        .wake
                        .wait(st)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(remaining) if remaining.is_zero() => return true,
                Some(remaining) => {
                    let (guard, res) = self
                        .shared
                        .wake
                        .wait_timeout(st, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    st = guard;
                    if res.timed_out() {
                        return st.running;
                    }
                }
            }
        }
    }

    /// Query every moving axis whose stale-data delay has passed.
    fn poll_moving(&mut self) {
        let now = Instant::now();
        let due: Vec<AxisId> = {
            let st = self.shared.lock();
            st.in_motion
                .iter()
                .filter(|(_, m)| now.saturating_duration_since(m.since) >= self.stale_delay)
                .map(|(axis, _)| *axis)
                .collect()
        };

        for axis in due {
            match self.read_status(axis) {
                Ok(reading) => self.deliver(axis, reading),
                Err(e) => self.read_failed(axis, e),
            }
        }
    }

    /// Send everything queued, oldest first.
    fn drain_queue(&mut self) {
        loop {
            let next = self.shared.lock().queue.pop_front();
            let Some(req) = next else { break };
            self.dispatch(req);
        }
    }

    fn dispatch(&mut self, req: CommandRequest) {
        let class = req.kind.class();
        if class == MessageClass::Info {
            self.answer_info(req.axis);
            return;
        }

        if let Err(e) = self.send_command(&req) {
            self.stats.command_failures += 1;
            warn!(
                "Controller '{}': {:?} for axis {} failed: {}",
                self.name, req.kind, req.axis, e
            );
        }

        // A failed motion command still registers the axis; the next poll
        // reports whatever the controller actually did.
        let now = Instant::now();
        let mut st = self.shared.lock();
        match class {
            MessageClass::Motion | MessageClass::Velocity => {
                let follow_up = req
                    .follow_up
                    .or_else(|| st.in_motion.get(&req.axis).and_then(|m| m.follow_up));
                st.in_motion
                    .insert(req.axis, InMotion { since: now, follow_up });
            }
            MessageClass::Immediate => {
                if let Some(m) = st.in_motion.get_mut(&req.axis) {
                    m.since = now;
                }
            }
            MessageClass::Info => {}
        }
    }

    /// Fresh status read on request, with the done bit taken from the
    /// worker's own motion tracking.
    fn answer_info(&mut self, axis: AxisId) {
        let since = self.shared.lock().in_motion.get(&axis).map(|m| m.since);
        if let Some(since) = since {
            let elapsed = since.elapsed();
            if elapsed < self.stale_delay {
                thread::sleep(self.stale_delay - elapsed);
            }
        }

        match self.read_status(axis) {
            Ok(mut reading) => {
                if !self.shared.lock().in_motion.contains_key(&axis) {
                    reading.status.insert(StatusBits::DONE);
                    reading.status.remove(StatusBits::MOVING);
                }
                self.deliver(axis, reading);
            }
            Err(e) => self.read_failed(axis, e),
        }
    }

    fn send_command(&mut self, req: &CommandRequest) -> Result<(), ProtocolError> {
        let frame = self.encoder.encode(req.axis, req.kind, req.param)?;
        if frame.is_empty() {
            return Ok(());
        }
        trace!("Controller '{}' -> {:?}", self.name, String::from_utf8_lossy(&frame));
        self.transport.send(&frame)?;
        self.stats.commands_sent += 1;
        for _ in 0..self.encoder.reply_count(req.kind) {
            self.transport.receive(self.reply_timeout)?;
        }
        Ok(())
    }

    fn read_status(&mut self, axis: AxisId) -> Result<AxisReading, ProtocolError> {
        self.stats.status_reads += 1;
        let query = self.encoder.encode(axis, CommandKind::GetInfo, 0.0)?;
        self.transport.send(&query)?;
        let reply = self.transport.receive(self.reply_timeout)?;
        self.encoder.decode(&reply)
    }

    /// Record a good reading, retire finished motion, and emit the event.
    fn deliver(&mut self, axis: AxisId, mut reading: AxisReading) {
        let health = self.health.entry(axis).or_default();
        if health.consecutive_failures > 0 {
            debug!("Axis {axis}: communication recovered");
        }
        health.consecutive_failures = 0;
        health.last = reading;

        // A retired axis gets no further polls, so its last event must
        // read as done.
        let finished = reading.status.is_terminal();
        if finished {
            reading.status.insert(StatusBits::DONE);
            reading.status.remove(StatusBits::MOVING);
        }
        let follow_up = if finished {
            self.shared
                .lock()
                .in_motion
                .remove(&axis)
                .and_then(|m| m.follow_up)
        } else {
            None
        };

        trace!(
            "Axis {axis}: pos={} enc={} status={:?}",
            reading.position, reading.encoder_position, reading.status
        );
        self.emit(StatusEvent::from_reading(axis, reading));

        if let Some(f) = follow_up {
            debug!("Axis {axis}: motion complete, sending follow-up {:?}", f.kind);
            self.dispatch(CommandRequest::new(axis, f.kind, f.param));
        }
    }

    /// First failure is retried on the next poll; the second in a row is a
    /// comm fault and the axis stops being tracked.
    fn read_failed(&mut self, axis: AxisId, err: ProtocolError) {
        self.stats.read_failures += 1;
        let health = self.health.entry(axis).or_default();
        health.consecutive_failures += 1;
        let failures = health.consecutive_failures;
        let last = health.last;

        if failures < COMM_FAULT_THRESHOLD {
            debug!("Axis {axis}: status read failed ({err}), retrying");
            return;
        }

        warn!("Axis {axis}: {failures} consecutive status read failures ({err})");
        self.shared.lock().in_motion.remove(&axis);
        self.emit(StatusEvent::comm_fault(axis, last));
    }

    fn emit(&mut self, event: StatusEvent) {
        self.stats.events += 1;
        if self.events.send(event).is_err() {
            trace!("Controller '{}': event receiver gone", self.name);
        }
    }
}
