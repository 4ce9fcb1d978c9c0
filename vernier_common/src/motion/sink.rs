//! The seam between a supervisor and whatever delivers its commands.

use std::sync::Arc;

use super::command::CommandRequest;
use super::error::SubmitError;

/// Accepts command batches for delivery to hardware.
///
/// A batch is one logical transaction: it is queued completely or not at
/// all, and its requests reach the transport in order.
pub trait CommandSink {
    fn submit(&self, batch: &[CommandRequest]) -> Result<(), SubmitError>;
}

impl<T: CommandSink + ?Sized> CommandSink for &T {
    fn submit(&self, batch: &[CommandRequest]) -> Result<(), SubmitError> {
        (**self).submit(batch)
    }
}

impl<T: CommandSink + ?Sized> CommandSink for Arc<T> {
    fn submit(&self, batch: &[CommandRequest]) -> Result<(), SubmitError> {
        (**self).submit(batch)
    }
}

impl<T: CommandSink + ?Sized> CommandSink for Box<T> {
    fn submit(&self, batch: &[CommandRequest]) -> Result<(), SubmitError> {
        (**self).submit(batch)
    }
}
