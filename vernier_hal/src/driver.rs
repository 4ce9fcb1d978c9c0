//! Vendor contracts and HAL error types.
//!
//! This module defines:
//! - `Transport` trait - Byte-stream connection to one controller
//! - `CommandEncoder` trait - Vendor command syntax and reply parsing
//! - `EncoderFactory` type alias - Factory function type
//! - `HalError` enum - Error types for controller lifecycle

use std::time::Duration;
use thiserror::Error;
use vernier_common::motion::command::CommandKind;
use vernier_common::motion::error::{ProtocolError, SubmitError};
use vernier_common::motion::status::AxisReading;
use vernier_common::motion::types::AxisId;

/// Error types for controller lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// No encoder registered under this vendor name.
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// A vendor name was registered twice.
    #[error("Driver '{0}' is already registered")]
    DuplicateDriver(&'static str),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Submission refused.
    #[error("Submission failed: {0}")]
    Submit(#[from] SubmitError),

    /// Worker thread could not be started.
    #[error("Failed to spawn controller worker: {0}")]
    SpawnFailed(String),

    /// Worker thread panicked.
    #[error("Controller worker '{0}' terminated abnormally")]
    WorkerPanicked(String),

    /// Controller communication error
    #[error("Hardware communication error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Byte-stream connection to one controller (serial, GPIB, TCP, ...).
///
/// Owned by the controller's worker thread; never shared.
pub trait Transport: Send {
    /// Write one complete command frame.
    fn send(&mut self, bytes: &[u8]) -> Result<(), ProtocolError>;

    /// Read one complete reply frame, waiting at most `timeout`.
    ///
    /// # Errors
    /// `ProtocolError::Timeout` when nothing arrives in time.
    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, ProtocolError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        (**self).send(bytes)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, ProtocolError> {
        (**self).receive(timeout)
    }
}

/// Vendor-specific command syntax.
///
/// The core calls [`encode`](Self::encode) for every queued command and for
/// every status query (`CommandKind::GetInfo`), and [`decode`](Self::decode)
/// on the status reply. Both are total: anything they cannot handle is a
/// `ProtocolError`, never a panic.
///
/// # Lifecycle
///
/// 1. `connect()` - Once, on the caller's thread, before the worker starts
/// 2. `encode()` / `decode()` - From the worker thread only
pub trait CommandEncoder: Send {
    /// Vendor identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Encoder semantic version.
    fn version(&self) -> &'static str;

    /// Bring the controller into a known state (echo off, units, ...).
    fn connect(&mut self, transport: &mut dyn Transport) -> Result<(), ProtocolError> {
        let _ = transport;
        Ok(())
    }

    /// Wire bytes for one command. An empty frame means "nothing to send"
    /// for vendors that fold the command into a neighbouring one.
    fn encode(&self, axis: AxisId, kind: CommandKind, param: f64)
    -> Result<Vec<u8>, ProtocolError>;

    /// Parse a status reply.
    fn decode(&self, reply: &[u8]) -> Result<AxisReading, ProtocolError>;

    /// Replies the controller sends back for `kind`, excluding status
    /// queries which always yield exactly one.
    fn reply_count(&self, kind: CommandKind) -> usize {
        let _ = kind;
        0
    }
}

/// Factory function type for creating encoder instances.
pub type EncoderFactory = fn() -> Box<dyn CommandEncoder>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_wraps() {
        let e: HalError = ProtocolError::Timeout.into();
        assert_eq!(
            e.to_string(),
            "Hardware communication error: timed out waiting for controller reply"
        );
    }

    #[test]
    fn submit_error_wraps() {
        let e: HalError = SubmitError::Closed.into();
        assert!(matches!(e, HalError::Submit(SubmitError::Closed)));
    }
}
