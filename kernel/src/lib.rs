//! TKOS Kernel Library
//!
//! The user-process layer of a teaching kernel running on a simulated
//! single-core machine: per-process virtual address spaces, COFF loading,
//! process lifecycle (exec, join, exit), per-process descriptor tables and
//! the syscall dispatcher.
//!
//! # Layout
//!
//! - [`machine`]: physical memory, clock, registers and the processor contract
//! - [`memory`]: frame allocator and address spaces
//! - [`loader`]: executable images and program layout
//! - [`vfs`]: file store, console and descriptor tables
//! - [`process`]: process records, registry and lifecycle
//! - [`syscall`]: trap decoding and syscall handlers
//! - [`kernel`]: the [`Kernel`] context tying it together

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod kernel;
pub mod loader;
pub mod machine;
pub mod memory;
pub mod process;
pub mod scheduler;
pub mod sync;
pub mod syscall;
pub mod vfs;

pub use kernel::{Kernel, KernelBuilder, KernelError};
