//! Scheduler contract.
//!
//! Thread creation and switching belong to the host scheduler; the
//! user-process layer only needs to start a new execution context and to
//! give up the processor while it waits. [`Alarm`] puts contexts to sleep
//! against the machine clock.

pub mod alarm;

use alloc::boxed::Box;

pub use alarm::Alarm;

/// Scheduler errors.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no execution context available")]
    Unavailable,
}

/// The host scheduler.
pub trait Scheduler: Send + Sync {
    /// Start a new execution context named `name` that runs `body` and then
    /// finishes.
    fn fork(&self, name: &str, body: Box<dyn FnOnce() + Send>) -> Result<(), SchedulerError>;

    /// Let other contexts run.
    fn yield_now(&self);
}
