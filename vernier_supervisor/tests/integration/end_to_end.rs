//! Integration test: supervisors on a live controller worker.
//!
//! Validates: supervisor batches → controller queue → simulated stage →
//! status polling → supervisor decisions, with backlash slack, undershoot
//! and dropped replies injected at the bench.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use vernier_common::motion::error::MotionError;
use vernier_common::motion::status::StatusEvent;
use vernier_common::motion::types::{AxisId, Sense};
use vernier_hal::config::ControllerConfig;
use vernier_hal::controller::{Controller, ControllerHandle};
use vernier_hal::drivers::simulation::{SimBench, SimEncoder, SimulationConfig};
use vernier_supervisor::{AxisParams, AxisRegistry, MotionMode, MotionSupervisor};

// ── Rig ─────────────────────────────────────────────────────────────

const WAIT: Duration = Duration::from_secs(10);
const AXIS: AxisId = AxisId::new(0, 0);

struct Rig {
    controller: Controller,
    bench: SimBench,
    events: Receiver<StatusEvent>,
    registry: AxisRegistry<ControllerHandle>,
}

impl Rig {
    fn new(sim: SimulationConfig, params: AxisParams) -> Self {
        let mut cfg = ControllerConfig::new("bench", "simulation");
        cfg.poll_interval_ms = 20;
        cfg.stale_delay_ms = 5;
        cfg.reply_timeout_ms = 10;
        cfg.simulation = sim;

        let bench = SimBench::new(&cfg.simulation);
        let (tx, events) = mpsc::channel();
        let controller =
            Controller::spawn(&cfg, Box::new(SimEncoder), Box::new(bench.transport()), tx)
                .expect("controller should start");

        let mut registry = AxisRegistry::new();
        registry
            .insert(MotionSupervisor::new(AXIS, "x", params, controller.handle()))
            .unwrap();
        registry.refresh_all().unwrap();

        let mut rig = Self {
            controller,
            bench,
            events,
            registry,
        };
        rig.pump_one();
        rig
    }

    fn axis(&mut self) -> &mut MotionSupervisor<ControllerHandle> {
        self.registry.get_mut(AXIS).unwrap()
    }

    /// Dispatch one event (or fire a timer), failing after `WAIT`.
    fn pump_one(&mut self) {
        let wait = self
            .registry
            .next_deadline()
            .map_or(WAIT, |d| d.saturating_duration_since(Instant::now()));
        match self.events.recv_timeout(wait) {
            Ok(event) => self.registry.dispatch(&event).unwrap(),
            Err(RecvTimeoutError::Timeout) if self.registry.next_deadline().is_some() => {}
            Err(e) => panic!("no status event: {e}"),
        }
        self.registry.tick(Instant::now());
    }

    fn pump_until(&mut self, what: &str, pred: impl Fn(&Self) -> bool) {
        let deadline = Instant::now() + WAIT;
        while !pred(self) {
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {what}: {:?}",
                self.registry.snapshots()
            );
            self.pump_one();
        }
    }

    fn run_until_done(&mut self) {
        self.pump_until("done", |rig| rig.registry.all_done());
    }

    fn frames(&self, prefix: &str) -> Vec<String> {
        self.bench
            .command_log()
            .into_iter()
            .filter(|f| f.starts_with(prefix))
            .collect()
    }

    fn shutdown(self) {
        self.controller.shutdown().unwrap();
    }
}

fn fast() -> AxisParams {
    AxisParams {
        velocity: 5000.0,
        ..AxisParams::default()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn move_lands_on_target() {
    let mut rig = Rig::new(SimulationConfig::default(), fast());
    rig.axis().set_target(200.0).unwrap();
    rig.run_until_done();

    assert_eq!(rig.bench.position(0), Some(200.0));
    let snap = rig.axis().snapshot();
    assert_eq!(snap.mode, MotionMode::Idle);
    assert_eq!(snap.readback_user, 200.0);
    assert!(snap.done() && !snap.moving());
    assert_eq!(rig.frames("0MA"), vec!["0MA200"]);
    rig.shutdown();
}

#[test]
fn backlash_is_taken_up_from_the_preferred_side() {
    let sim = SimulationConfig {
        backlash_steps: 4.0,
        ..SimulationConfig::default()
    };
    let params = AxisParams {
        resolution: 0.001,
        backlash_distance: -0.01,
        velocity: 5.0,
        backlash_velocity: 1.0,
        ..AxisParams::default()
    };
    let mut rig = Rig::new(sim, params);
    rig.axis().set_target(1.0).unwrap();
    rig.run_until_done();

    assert_eq!(rig.frames("0MA"), vec!["0MA1010", "0MA1000"]);
    assert_eq!(rig.bench.position(0), Some(1000.0));
    // Approaching downward leaves the load above the motor.
    assert_eq!(rig.bench.encoder_position(0), Some(1002.0));
    rig.shutdown();
}

#[test]
fn undershoot_converges_with_encoder_feedback() {
    let sim = SimulationConfig {
        undershoot: 0.1,
        ..SimulationConfig::default()
    };
    let params = AxisParams {
        use_encoder: true,
        ..fast()
    };
    let mut rig = Rig::new(sim, params);
    rig.axis().set_target(1000.0).unwrap();
    rig.run_until_done();

    let moves = rig.frames("0MR");
    assert_eq!(moves.first().map(String::as_str), Some("0MR1000"));
    assert!(moves.len() >= 2, "expected corrections, got {moves:?}");

    let axis = rig.axis();
    assert!((axis.readback().user - 1000.0).abs() < axis.params().retry_deadband);
    assert!(!axis.flags().missed);
    rig.shutdown();
}

#[test]
fn retries_stop_at_the_configured_bound() {
    let sim = SimulationConfig {
        undershoot: 0.5,
        ..SimulationConfig::default()
    };
    let params = AxisParams {
        retry_max: 2,
        ..fast()
    };
    let mut rig = Rig::new(sim, params);
    rig.axis().set_target(1000.0).unwrap();
    rig.run_until_done();

    assert_eq!(rig.frames("0MA").len(), 3);
    assert_eq!(rig.bench.position(0), Some(875.0));
    let axis = rig.axis();
    assert!(axis.flags().missed);
    assert!(matches!(
        axis.last_error(),
        Some(MotionError::RetryExhausted { attempts: 2, .. })
    ));
    rig.shutdown();
}

#[test]
fn stop_interrupts_a_long_move() {
    let params = AxisParams {
        velocity: 200.0,
        ..AxisParams::default()
    };
    let mut rig = Rig::new(SimulationConfig::default(), params);
    rig.axis().set_target(100_000.0).unwrap();
    rig.pump_until("motion", |rig| {
        rig.registry.get(AXIS).is_some_and(|a| a.flags().moving)
    });
    rig.axis().stop().unwrap();
    rig.run_until_done();

    let log = rig.bench.command_log();
    let pos = |frame: &str| log.iter().position(|f| f == frame).unwrap();
    assert!(pos("0MA100000") < pos("0GO"));
    assert!(pos("0GO") < pos("0ST"));

    let stopped_at = rig.bench.position(0).unwrap();
    assert!(stopped_at < 100_000.0);
    let axis = rig.axis();
    assert_eq!(axis.target().user, axis.readback().user);
    assert_eq!(axis.mode(), MotionMode::Idle);
    rig.shutdown();
}

#[test]
fn home_search_ends_on_the_switch() {
    let sim = SimulationConfig {
        home_steps: 300.0,
        ..SimulationConfig::default()
    };
    let mut rig = Rig::new(sim, fast());
    rig.axis().home(Sense::Forward).unwrap();
    rig.run_until_done();

    assert_eq!(rig.frames("0HF"), vec!["0HF"]);
    let axis = rig.axis();
    assert!(axis.flags().homed);
    assert!(axis.flags().at_home);
    assert_eq!(axis.target().user, 300.0);
    rig.shutdown();
}

#[test]
fn jog_release_stops_the_axis() {
    let params = AxisParams {
        jog_velocity: 500.0,
        ..AxisParams::default()
    };
    let mut rig = Rig::new(SimulationConfig::default(), params);
    rig.axis().jog(Sense::Forward, None).unwrap();
    rig.pump_until("jog motion", |rig| {
        rig.registry.get(AXIS).is_some_and(|a| a.flags().moving)
    });
    rig.axis().jog_release().unwrap();
    rig.run_until_done();

    assert_eq!(rig.frames("0JG"), vec!["0JG500"]);
    assert!(!rig.bench.is_moving(0));
    let axis = rig.axis();
    assert!(axis.readback().user > 0.0);
    assert_eq!(axis.target().user, axis.readback().user);
    rig.shutdown();
}

#[test]
fn lost_replies_latch_a_comm_fault_until_reset() {
    let params = AxisParams {
        velocity: 500.0,
        ..AxisParams::default()
    };
    let mut rig = Rig::new(SimulationConfig::default(), params);
    rig.axis().set_target(200.0).unwrap();
    rig.bench.drop_next_replies(2);
    rig.run_until_done();

    assert!(rig.axis().flags().comm_error);
    assert_eq!(rig.axis().set_target(0.0), Err(MotionError::CommError(AXIS)));

    let deadline = Instant::now() + WAIT;
    while rig.bench.is_moving(0) {
        assert!(Instant::now() < deadline, "stage never stopped");
        std::thread::sleep(Duration::from_millis(10));
    }
    rig.axis().reset_fault().unwrap();
    rig.pump_one();
    assert!(!rig.axis().flags().comm_error);
    assert_eq!(rig.axis().readback().user, 200.0);

    rig.axis().set_target(50.0).unwrap();
    rig.run_until_done();
    assert_eq!(rig.bench.position(0), Some(50.0));
    rig.shutdown();
}
