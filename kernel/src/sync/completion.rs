//! One-shot completion signal.
//!
//! An execution context raises its completion when it terminates; `join`
//! waits on it. Waiting yields to the scheduler until the signal is seen and
//! has no timeout.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::scheduler::Scheduler;

/// A flag that goes from unset to set exactly once.
#[derive(Debug, Default)]
pub struct Completion {
    done: AtomicBool,
}

impl Completion {
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
        }
    }

    /// Raise the signal. Returns `false` if it was already raised.
    pub fn signal(&self) -> bool {
        !self.done.swap(true, Ordering::AcqRel)
    }

    /// Whether the signal has been raised.
    pub fn is_signaled(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Block the calling context until the signal is raised.
    pub fn wait(&self, scheduler: &dyn Scheduler) {
        while !self.is_signaled() {
            scheduler.yield_now();
        }
    }
}
