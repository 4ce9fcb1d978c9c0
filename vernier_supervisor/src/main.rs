//! # Vernier
//!
//! Spawns one controller per `[[controllers]]` entry, supervises every
//! configured axis, drives the requested targets to completion and prints
//! the final axis state as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Move two axes on the simulated bench
//! vernier --config config/vernier.toml --target slit_x=1.5 --target slit_y=-0.2
//!
//! # Keep supervising until Ctrl-C, with debug logs as JSON
//! vernier --config config/vernier.toml --hold -v --json
//! ```

#![deny(warnings)]

use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use vernier_common::config::{ConfigLoader, LogLevel};
use vernier_common::motion::status::StatusEvent;
use vernier_hal::drivers::simulation::{self, SimBench};
use vernier_hal::{Controller, ControllerConfig, ControllerHandle, DriverRegistry, HalError, Transport};
use vernier_supervisor::{AxisRegistry, MotionSupervisor, SupervisorConfig};

/// Longest wait between loop iterations when no timer is pending.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// How long to wait for every axis to report its first status.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Vernier - single-axis motion supervision over shared controllers
#[derive(Parser, Debug)]
#[command(name = "vernier")]
#[command(version)]
#[command(about = "Motion supervisor with backlash, retry and soft-limit handling")]
#[command(long_about = None)]
struct Args {
    /// Path to the supervisor configuration file.
    #[arg(short, long, default_value = "/etc/vernier/vernier.toml")]
    config: PathBuf,

    /// Move an axis: `NAME=POSITION` in user units (can be repeated).
    #[arg(short, long = "target", value_parser = parse_target, action = clap::ArgAction::Append)]
    targets: Vec<(String, f64)>,

    /// Keep supervising after all axes are done, until Ctrl-C.
    #[arg(long)]
    hold: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn parse_target(s: &str) -> Result<(String, f64), String> {
    let (name, pos) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=POSITION, got '{s}'"))?;
    let pos: f64 = pos
        .trim()
        .parse()
        .map_err(|e| format!("bad position '{pos}': {e}"))?;
    if !pos.is_finite() {
        return Err(format!("position for '{name}' must be finite"));
    }
    Ok((name.trim().to_string(), pos))
}

fn main() {
    if let Err(e) = run() {
        eprintln!("vernier: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = SupervisorConfig::load(&args.config)?;
    setup_tracing(&args, config.shared.log_level);
    info!(
        "Vernier v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    let drivers = DriverRegistry::with_builtin();
    config.check_vendors(&drivers)?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    let (events_tx, events) = mpsc::channel();
    let mut controllers = Vec::with_capacity(config.controllers.len());
    for section in &config.controllers {
        let encoder = drivers.create_encoder(&section.link.vendor)?;
        let transport = open_transport(&section.link)?;
        controllers.push(Controller::spawn(
            &section.link,
            encoder,
            transport,
            events_tx.clone(),
        )?);
    }
    drop(events_tx);

    let result = supervise(&args, &config, &controllers, &events, &running);

    for controller in controllers {
        let name = controller.name().to_string();
        match controller.shutdown() {
            Ok(stats) => debug!("Controller '{name}' stopped: {stats:?}"),
            Err(e) => error!("Controller '{name}' shutdown failed: {e}"),
        }
    }
    info!("Vernier shutdown complete");
    result
}

fn supervise(
    args: &Args,
    config: &SupervisorConfig,
    controllers: &[Controller],
    events: &Receiver<StatusEvent>,
    running: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry: AxisRegistry<ControllerHandle> = AxisRegistry::new();
    for (id, axis) in config.axes() {
        let handle = controllers[usize::from(id.controller)].handle();
        registry.insert(MotionSupervisor::new(
            id,
            axis.name.clone(),
            axis.params.clone(),
            handle,
        ))?;
    }
    info!(
        "Supervising {} axes on {} controllers",
        registry.len(),
        controllers.len()
    );

    for (name, _) in &args.targets {
        if registry.id_of(name).is_none() {
            return Err(format!("unknown axis '{name}'").into());
        }
    }

    registry.refresh_all()?;
    wait_for_first_status(&mut registry, events, running)?;

    for (name, position) in &args.targets {
        if let Some(axis) = registry.by_name_mut(name) {
            match axis.set_target(*position) {
                Ok(()) => info!("{name}: target {position}"),
                Err(e) => warn!("{name}: target {position} rejected: {e}"),
            }
        }
    }

    while running.load(Ordering::SeqCst) {
        let wait = registry
            .next_deadline()
            .map_or(IDLE_WAIT, |d| {
                d.saturating_duration_since(Instant::now()).min(IDLE_WAIT)
            });
        match events.recv_timeout(wait) {
            Ok(event) => {
                if let Err(e) = registry.dispatch(&event) {
                    warn!("{e}");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                error!("All controllers stopped");
                break;
            }
        }
        registry.tick(Instant::now());

        if !args.hold && registry.all_done() {
            break;
        }
    }

    println!("{}", serde_json::to_string_pretty(&registry.snapshots())?);
    Ok(())
}

/// Dispatch events until every axis has reported once.
fn wait_for_first_status(
    registry: &mut AxisRegistry<ControllerHandle>,
    events: &Receiver<StatusEvent>,
    running: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut seen = HashSet::new();
    let deadline = Instant::now() + STARTUP_TIMEOUT;
    while seen.len() < registry.len() && running.load(Ordering::SeqCst) {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(format!(
                "only {} of {} axes reported status within {:?}",
                seen.len(),
                registry.len(),
                STARTUP_TIMEOUT
            )
            .into());
        }
        match events.recv_timeout(left.min(IDLE_WAIT)) {
            Ok(event) => {
                if registry.dispatch(&event).is_ok() {
                    seen.insert(event.axis);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err("controllers stopped during startup".into());
            }
        }
    }
    Ok(())
}

/// Byte transport for a controller. Only the simulated bench is built in.
fn open_transport(link: &ControllerConfig) -> Result<Box<dyn Transport>, HalError> {
    if link.vendor == simulation::VENDOR {
        let bench = SimBench::new(&link.simulation);
        Ok(Box::new(bench.transport()))
    } else {
        Err(HalError::ConfigError(format!(
            "controller '{}': no transport available for vendor '{}'",
            link.name, link.vendor
        )))
    }
}

/// Setup tracing subscriber based on CLI arguments and the shared config.
fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_argument_parses() {
        assert_eq!(parse_target("slit_x=1.5"), Ok(("slit_x".to_string(), 1.5)));
        assert_eq!(parse_target(" y = -2 "), Ok(("y".to_string(), -2.0)));
        assert!(parse_target("slit_x").is_err());
        assert!(parse_target("slit_x=abc").is_err());
        assert!(parse_target("slit_x=inf").is_err());
    }
}
