//! Virtual File System
//!
//! The named-file store and console the kernel sits on, reduced to the
//! operations processes need: open or create by name, positional read and
//! write, close, remove. [`fd`] holds the per-process descriptor table built
//! on top of them.

pub mod console;
pub mod fd;
pub mod ramfs;

use alloc::boxed::Box;

pub use console::MemoryConsole;
pub use fd::{Descriptor, DescriptorTable, FdError};
pub use ramfs::RamFs;

/// VFS error.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    #[error("file not found")]
    NotFound,
    #[error("file is closed")]
    Closed,
    #[error("I/O error")]
    IoError,
}

/// An open file.
pub trait OpenFile: Send {
    /// Name the file was opened under.
    fn name(&self) -> &str;

    /// Read into `buf` starting at byte `pos`. Streams ignore `pos`.
    /// Returns bytes read; zero at end of file.
    fn read(&mut self, pos: usize, buf: &mut [u8]) -> Result<usize, VfsError>;

    /// Write `data` starting at byte `pos`. Streams ignore `pos`.
    fn write(&mut self, pos: usize, data: &[u8]) -> Result<usize, VfsError>;

    /// Current length, if the file has one.
    fn length(&self) -> Option<usize>;

    /// Release the handle. Later reads and writes fail.
    fn close(&mut self);
}

/// A store of named files.
pub trait FileSystem: Send + Sync {
    /// Open `name`, creating it empty if missing and `create` is set.
    fn open(&self, name: &str, create: bool) -> Result<Box<dyn OpenFile>, VfsError>;

    /// Delete `name`.
    fn remove(&self, name: &str) -> Result<(), VfsError>;
}

/// The machine console.
pub trait Console: Send + Sync {
    /// Stream of keyboard input.
    fn open_for_reading(&self) -> Box<dyn OpenFile>;

    /// Stream to the display.
    fn open_for_writing(&self) -> Box<dyn OpenFile>;
}
