//! Memory management
//!
//! Physical frames come from the shared [`FrameAllocator`]; every process
//! owns an [`AddressSpace`] that maps its virtual pages onto those frames
//! and carries all data across the user/kernel boundary.

pub mod address_space;
pub mod frame;

pub use address_space::{Access, AddressSpace, EntryFlags, TranslationEntry, Translation};
pub use frame::FrameAllocator;

/// Memory errors.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// Page outside the table, or entry not valid.
    #[error("bad virtual address {0:#x}")]
    BadAddress(u32),

    /// Write to a read-only page.
    #[error("write to read-only page at {0:#x}")]
    ReadOnlyViolation(u32),

    /// The frame pool cannot satisfy a request.
    #[error("out of physical frames: requested {requested}, available {available}")]
    OutOfFrames { requested: usize, available: usize },
}
