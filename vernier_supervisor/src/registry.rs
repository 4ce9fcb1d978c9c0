//! Registry of axis supervisors.
//!
//! Built once at configuration time. Routes each status event to the one
//! supervisor that owns the axis and drives settle timers.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::warn;
use vernier_common::motion::error::MotionError;
use vernier_common::motion::sink::CommandSink;
use vernier_common::motion::status::StatusEvent;
use vernier_common::motion::types::AxisId;

use crate::snapshot::AxisSnapshot;
use crate::supervisor::MotionSupervisor;

pub struct AxisRegistry<S: CommandSink> {
    axes: BTreeMap<AxisId, MotionSupervisor<S>>,
    names: HashMap<String, AxisId>,
}

impl<S: CommandSink> Default for AxisRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CommandSink> AxisRegistry<S> {
    pub fn new() -> Self {
        Self {
            axes: BTreeMap::new(),
            names: HashMap::new(),
        }
    }

    /// Add a supervisor. Axis ids and names must be unique.
    pub fn insert(&mut self, supervisor: MotionSupervisor<S>) -> Result<(), MotionError> {
        let id = supervisor.axis();
        if self.axes.contains_key(&id) {
            return Err(MotionError::ConfigurationError(format!(
                "axis {id} registered twice"
            )));
        }
        if self.names.contains_key(supervisor.name()) {
            return Err(MotionError::ConfigurationError(format!(
                "axis name '{}' registered twice",
                supervisor.name()
            )));
        }
        self.names.insert(supervisor.name().to_string(), id);
        self.axes.insert(id, supervisor);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn get(&self, id: AxisId) -> Option<&MotionSupervisor<S>> {
        self.axes.get(&id)
    }

    pub fn get_mut(&mut self, id: AxisId) -> Option<&mut MotionSupervisor<S>> {
        self.axes.get_mut(&id)
    }

    pub fn id_of(&self, name: &str) -> Option<AxisId> {
        self.names.get(name).copied()
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut MotionSupervisor<S>> {
        let id = self.id_of(name)?;
        self.axes.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MotionSupervisor<S>> {
        self.axes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MotionSupervisor<S>> {
        self.axes.values_mut()
    }

    /// Deliver `event` to its supervisor.
    pub fn dispatch(&mut self, event: &StatusEvent) -> Result<(), MotionError> {
        match self.axes.get_mut(&event.axis) {
            Some(supervisor) => {
                supervisor.handle_status(event);
                Ok(())
            }
            None => {
                warn!("Status event for unregistered axis {}", event.axis);
                Err(MotionError::UnknownAxis(event.axis))
            }
        }
    }

    /// Run every supervisor's timers up to `now`.
    pub fn tick(&mut self, now: Instant) {
        for supervisor in self.axes.values_mut() {
            supervisor.tick(now);
        }
    }

    /// Earliest pending timer across all axes.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.axes.values().filter_map(|s| s.next_deadline()).min()
    }

    /// Ask every axis for fresh status. Returns the first failure.
    pub fn refresh_all(&mut self) -> Result<(), MotionError> {
        let mut first = Ok(());
        for supervisor in self.axes.values_mut() {
            if let Err(e) = supervisor.refresh() {
                if first.is_ok() {
                    first = Err(e);
                }
            }
        }
        first
    }

    pub fn all_done(&self) -> bool {
        self.axes.values().all(|s| s.is_done())
    }

    pub fn snapshots(&self) -> Vec<AxisSnapshot> {
        self.axes.values().map(MotionSupervisor::snapshot).collect()
    }
}
