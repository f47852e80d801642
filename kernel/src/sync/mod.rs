//! Synchronization primitives built on the scheduler contract.

pub mod completion;

pub use completion::Completion;
