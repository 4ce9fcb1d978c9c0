//! Integration test: registry-level motion scenarios.
//!
//! Status events are scripted by hand and every submitted batch is
//! recorded, so command sequences can be checked exactly.

use std::sync::{Arc, Mutex};

use vernier_common::motion::command::{CommandKind, CommandRequest};
use vernier_common::motion::error::{MotionError, SubmitError};
use vernier_common::motion::sink::CommandSink;
use vernier_common::motion::status::{StatusBits, StatusEvent};
use vernier_common::motion::types::AxisId;
use vernier_supervisor::{AxisParams, AxisRegistry, MotionMode, MotionSupervisor};

// ── Helpers ─────────────────────────────────────────────────────────

const X: AxisId = AxisId::new(0, 0);
const Y: AxisId = AxisId::new(0, 1);

#[derive(Clone, Default)]
struct Recorder {
    batches: Arc<Mutex<Vec<Vec<CommandRequest>>>>,
}

impl Recorder {
    fn take(&self) -> Vec<Vec<CommandRequest>> {
        std::mem::take(&mut *self.batches.lock().unwrap())
    }

    fn take_flat(&self) -> Vec<CommandRequest> {
        self.take().into_iter().flatten().collect()
    }
}

impl CommandSink for Recorder {
    fn submit(&self, batch: &[CommandRequest]) -> Result<(), SubmitError> {
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

fn done_at(axis: AxisId, raw: f64) -> StatusEvent {
    StatusEvent {
        axis,
        raw_position: raw,
        raw_encoder_position: raw,
        velocity: 0.0,
        status: StatusBits::DONE,
        comm_error: false,
    }
}

/// Registry with `x` on channel 0 and `y` on channel 1, both initialised
/// at raw 0.
fn bench(x: AxisParams, y: AxisParams) -> (AxisRegistry<Recorder>, Recorder) {
    let sink = Recorder::default();
    let mut reg = AxisRegistry::new();
    reg.insert(MotionSupervisor::new(X, "x", x, sink.clone())).unwrap();
    reg.insert(MotionSupervisor::new(Y, "y", y, sink.clone())).unwrap();
    reg.dispatch(&done_at(X, 0.0)).unwrap();
    reg.dispatch(&done_at(Y, 0.0)).unwrap();
    sink.take();
    (reg, sink)
}

fn moves(sent: &[CommandRequest]) -> Vec<(AxisId, CommandKind, f64)> {
    sent.iter()
        .filter(|r| matches!(r.kind, CommandKind::MoveAbsolute | CommandKind::MoveRelative))
        .map(|r| (r.axis, r.kind, r.param))
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn move_to_target_is_one_transaction_then_idle() {
    let (mut reg, sink) = bench(AxisParams::default(), AxisParams::default());
    reg.by_name_mut("x").unwrap().set_target(100.0).unwrap();

    let batches = sink.take();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(moves(batch), vec![(X, CommandKind::MoveAbsolute, 100.0)]);
    assert_eq!(batch.last().map(|r| r.kind), Some(CommandKind::Go));
    assert!(batch.iter().all(|r| r.axis == X));
    assert!(!reg.all_done());

    reg.dispatch(&done_at(X, 100.0)).unwrap();
    let x = reg.get(X).unwrap();
    assert_eq!(x.mode(), MotionMode::Idle);
    assert!(x.is_done());
    assert!(reg.all_done());
    assert!(sink.take().is_empty());
}

#[test]
fn repeated_target_sends_nothing() {
    let (mut reg, sink) = bench(AxisParams::default(), AxisParams::default());
    let x = reg.get_mut(X).unwrap();
    x.set_target(100.0).unwrap();
    reg.dispatch(&done_at(X, 100.0)).unwrap();
    sink.take();

    reg.get_mut(X).unwrap().set_target(100.0).unwrap();
    assert!(sink.take().is_empty());
    assert!(reg.get(X).unwrap().is_done());
}

#[test]
fn axes_move_independently() {
    let (mut reg, sink) = bench(AxisParams::default(), AxisParams::default());
    reg.get_mut(X).unwrap().set_target(5.0).unwrap();
    reg.get_mut(Y).unwrap().set_target(-3.0).unwrap();
    assert_eq!(
        moves(&sink.take_flat()),
        vec![
            (X, CommandKind::MoveAbsolute, 5.0),
            (Y, CommandKind::MoveAbsolute, -3.0)
        ]
    );

    reg.dispatch(&done_at(Y, -3.0)).unwrap();
    assert!(reg.get(Y).unwrap().is_done());
    assert!(!reg.get(X).unwrap().is_done());
    assert!(!reg.all_done());

    reg.dispatch(&done_at(X, 5.0)).unwrap();
    assert!(reg.all_done());
}

#[test]
fn negative_backlash_overshoots_then_approaches_from_above() {
    let params = AxisParams {
        resolution: 0.001,
        backlash_distance: -0.01,
        velocity: 2.0,
        backlash_velocity: 0.5,
        ..AxisParams::default()
    };
    let (mut reg, sink) = bench(params, AxisParams::default());
    reg.get_mut(X).unwrap().set_target(1.0).unwrap();

    let first = sink.take_flat();
    assert_eq!(moves(&first), vec![(X, CommandKind::MoveAbsolute, 1010.0)]);
    assert_eq!(reg.get(X).unwrap().mode(), MotionMode::MovingToTarget);

    reg.dispatch(&done_at(X, 1010.0)).unwrap();
    let second = sink.take_flat();
    assert_eq!(moves(&second), vec![(X, CommandKind::MoveAbsolute, 1000.0)]);
    let velocity = second
        .iter()
        .find(|r| r.kind == CommandKind::SetVelocity)
        .map(|r| r.param)
        .unwrap();
    assert!((velocity - 500.0).abs() < 1e-6, "backlash leg at {velocity}");
    assert_eq!(reg.get(X).unwrap().mode(), MotionMode::MovingBacklash);

    reg.dispatch(&done_at(X, 1000.0)).unwrap();
    assert!(sink.take().is_empty());
    assert!(reg.get(X).unwrap().is_done());
}

#[test]
fn persistent_miss_is_retried_a_bounded_number_of_times() {
    let params = AxisParams {
        retry_max: 3,
        ..AxisParams::default()
    };
    let (mut reg, sink) = bench(params, AxisParams::default());
    reg.get_mut(X).unwrap().set_target(100.0).unwrap();

    // The axis always stops halfway.
    for _ in 0..10 {
        if reg.get(X).unwrap().is_done() {
            break;
        }
        reg.dispatch(&done_at(X, 50.0)).unwrap();
    }

    let sent = sink.take_flat();
    assert_eq!(moves(&sent).len(), 4, "one move plus three retries");
    let x = reg.get(X).unwrap();
    assert!(x.is_done());
    assert!(x.flags().missed);
    assert!(matches!(
        x.last_error(),
        Some(MotionError::RetryExhausted { attempts: 3, .. })
    ));
}

#[test]
fn soft_limit_violation_keeps_previous_target() {
    let (mut reg, sink) = bench(AxisParams::default(), AxisParams::default());
    let x = reg.get_mut(X).unwrap();
    x.set_limits(-10.0, 10.0, true);
    let err = x.set_target(20.0).unwrap_err();
    assert!(matches!(err, MotionError::SoftLimitViolation { .. }));
    assert!(sink.take().is_empty());

    let snap = reg.get(X).unwrap().snapshot();
    assert_eq!(snap.target_user, 0.0);
    assert!(snap.flags.soft_limit_violation);
    assert!(snap.done());

    reg.get_mut(X).unwrap().set_target(5.0).unwrap();
    assert_eq!(
        moves(&sink.take_flat()),
        vec![(X, CommandKind::MoveAbsolute, 5.0)]
    );
    assert!(!reg.get(X).unwrap().snapshot().flags.soft_limit_violation);
}

#[test]
fn stop_follows_move_in_submission_order() {
    let (mut reg, sink) = bench(AxisParams::default(), AxisParams::default());
    let x = reg.get_mut(X).unwrap();
    x.set_target(1000.0).unwrap();
    x.stop().unwrap();

    let kinds: Vec<_> = sink.take_flat().iter().map(|r| r.kind).collect();
    let pos = |k| kinds.iter().position(|&x| x == k).unwrap();
    assert!(pos(CommandKind::MoveAbsolute) < pos(CommandKind::Go));
    assert!(pos(CommandKind::Go) < pos(CommandKind::Stop));
    assert_eq!(reg.get(X).unwrap().mode(), MotionMode::Stopping);

    reg.dispatch(&done_at(X, 12.0)).unwrap();
    let x = reg.get(X).unwrap();
    assert_eq!(x.mode(), MotionMode::Idle);
    assert_eq!(x.target().user, 12.0);
    assert!(sink.take().is_empty());
}

#[test]
fn subscriber_follows_a_move() {
    let (mut reg, _sink) = bench(AxisParams::default(), AxisParams::default());
    let rx = reg.get_mut(X).unwrap().subscribe();
    reg.get_mut(X).unwrap().set_target(10.0).unwrap();
    reg.dispatch(&done_at(X, 10.0)).unwrap();

    let modes: Vec<_> = rx.try_iter().map(|s| s.mode).collect();
    assert_eq!(
        modes,
        vec![MotionMode::Idle, MotionMode::MovingToTarget, MotionMode::Idle]
    );
}

#[test]
fn events_for_unknown_axes_do_not_disturb_others() {
    let (mut reg, _sink) = bench(AxisParams::default(), AxisParams::default());
    let stray = AxisId::new(4, 2);
    assert_eq!(
        reg.dispatch(&done_at(stray, 1.0)),
        Err(MotionError::UnknownAxis(stray))
    );
    assert!(reg.all_done());
    assert_eq!(reg.snapshots().len(), 2);
}
