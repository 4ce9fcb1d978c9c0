//! In-memory transport backed by simulated stages.
//!
//! [`SimTransport`] is handed to the controller worker; [`SimBench`] is a
//! cloneable view of the same bench for tests and the demo binary (inspect
//! positions, read the command log, inject faults).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;
use vernier_common::motion::error::ProtocolError;

use super::SimulationConfig;
use super::encoder::format_status;
use super::stage::SimStage;
use crate::driver::Transport;

struct Bench {
    stages: Vec<SimStage>,
    replies: VecDeque<Vec<u8>>,
    log: Vec<String>,
    drop_replies: u32,
    last_update: Instant,
}

impl Bench {
    fn advance(&mut self) {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_update);
        self.last_update = now;
        for stage in &mut self.stages {
            stage.update(dt);
        }
    }

    fn stage(&mut self, channel: u8) -> Result<&mut SimStage, ProtocolError> {
        self.stages
            .get_mut(channel as usize)
            .ok_or_else(|| ProtocolError::Io(format!("no simulated axis on channel {channel}")))
    }

    fn execute(&mut self, frame: &str) -> Result<(), ProtocolError> {
        let body = frame.trim_end_matches('\r');
        let split = body
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| ProtocolError::Malformed(format!("no mnemonic in {body:?}")))?;
        let (channel, rest) = body.split_at(split);
        let channel: u8 = channel
            .parse()
            .map_err(|_| ProtocolError::Malformed(format!("bad channel in {body:?}")))?;
        if rest.len() < 2 || !rest.is_char_boundary(2) {
            return Err(ProtocolError::Malformed(format!("short frame {body:?}")));
        }
        let (mnemonic, arg) = rest.split_at(2);
        let param = || -> Result<f64, ProtocolError> {
            arg.parse()
                .map_err(|_| ProtocolError::Malformed(format!("bad parameter in {body:?}")))
        };

        self.advance();
        if mnemonic != "TS" {
            self.log.push(body.to_string());
        }

        match mnemonic {
            "MA" => self.stage(channel)?.load_absolute(param()?),
            "MR" => self.stage(channel)?.load_relative(param()?),
            "GO" => self.stage(channel)?.go(),
            "HF" => self.stage(channel)?.home(true),
            "HR" => self.stage(channel)?.home(false),
            "LP" => self.stage(channel)?.load_position(param()?),
            "VB" => self.stage(channel)?.set_base_velocity(param()?),
            "VE" => self.stage(channel)?.set_velocity(param()?),
            "JG" | "JV" => self.stage(channel)?.jog(param()?),
            "ST" => self.stage(channel)?.stop(),
            "MO" => self.stage(channel)?.set_torque(true),
            "MF" => self.stage(channel)?.set_torque(false),
            "AC" | "ER" => {
                param()?;
                self.stage(channel)?;
            }
            "TS" => {
                let reading = self.stage(channel)?.reading();
                if self.drop_replies > 0 {
                    self.drop_replies -= 1;
                    trace!("sim: dropping status reply for channel {channel}");
                } else {
                    self.replies.push_back(format_status(channel, &reading));
                }
            }
            other => {
                return Err(ProtocolError::Malformed(format!("unknown mnemonic {other:?}")));
            }
        }
        Ok(())
    }
}

fn lock(bench: &Mutex<Bench>) -> MutexGuard<'_, Bench> {
    bench.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport end of a simulated controller.
pub struct SimTransport {
    bench: Arc<Mutex<Bench>>,
}

impl Transport for SimTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let frame = std::str::from_utf8(bytes).map_err(|e| ProtocolError::Io(e.to_string()))?;
        lock(&self.bench).execute(frame)
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Vec<u8>, ProtocolError> {
        lock(&self.bench)
            .replies
            .pop_front()
            .ok_or(ProtocolError::Timeout)
    }
}

/// Cloneable inspection handle on a simulated controller.
#[derive(Clone)]
pub struct SimBench {
    bench: Arc<Mutex<Bench>>,
}

impl SimBench {
    pub fn new(config: &SimulationConfig) -> Self {
        let stages = (0..config.axes).map(|_| SimStage::new(config)).collect();
        Self {
            bench: Arc::new(Mutex::new(Bench {
                stages,
                replies: VecDeque::new(),
                log: Vec::new(),
                drop_replies: 0,
                last_update: Instant::now(),
            })),
        }
    }

    /// Transport talking to this bench.
    pub fn transport(&self) -> SimTransport {
        SimTransport {
            bench: Arc::clone(&self.bench),
        }
    }

    /// Every frame received so far except status queries, without `\r`.
    pub fn command_log(&self) -> Vec<String> {
        lock(&self.bench).log.clone()
    }

    /// Motor position of `channel` in steps, after advancing the physics.
    pub fn position(&self, channel: u8) -> Option<f64> {
        let mut bench = lock(&self.bench);
        bench.advance();
        bench
            .stages
            .get(channel as usize)
            .map(SimStage::motor_position)
    }

    /// Load (encoder) position of `channel` in counts.
    pub fn encoder_position(&self, channel: u8) -> Option<f64> {
        let mut bench = lock(&self.bench);
        bench.advance();
        bench
            .stages
            .get(channel as usize)
            .map(SimStage::load_position_steps)
    }

    pub fn is_moving(&self, channel: u8) -> bool {
        let mut bench = lock(&self.bench);
        bench.advance();
        bench
            .stages
            .get(channel as usize)
            .is_some_and(SimStage::is_moving)
    }

    /// Swallow the next `count` status replies.
    pub fn drop_next_replies(&self, count: u32) {
        lock(&self.bench).drop_replies = count;
    }

    /// Make every subsequent move on `channel` land short by `fraction`.
    pub fn set_undershoot(&self, channel: u8, fraction: f64) {
        if let Some(stage) = lock(&self.bench).stages.get_mut(channel as usize) {
            stage.set_undershoot(fraction);
        }
    }

    /// Move `channel` by hand to `steps`.
    pub fn place(&self, channel: u8, steps: f64) {
        if let Some(stage) = lock(&self.bench).stages.get_mut(channel as usize) {
            stage.place(steps);
        }
    }
}
