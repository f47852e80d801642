//! Kernel configuration.
//!
//! Compile-time constants fix the user ABI (page size, descriptor capacity,
//! string limits). [`KernelConfig`] carries the values an embedder may tune
//! when building a [`Kernel`](crate::kernel::Kernel).

use alloc::string::String;

/// Page (and frame) size in bytes.
pub const PAGE_SIZE: usize = 0x400;

/// Default number of physical frames in the simulated machine.
pub const DEFAULT_PHYS_PAGES: usize = 64;

/// Pages reserved for each process's user stack.
pub const STACK_PAGES: usize = 8;

/// Open-file slots per process.
pub const MAX_DESCRIPTORS: usize = 16;

/// Longest string (terminator included) read out of user memory.
pub const MAX_STRING_LENGTH: usize = 256;

/// Required suffix for images passed to `exec`.
pub const EXECUTABLE_SUFFIX: &str = ".coff";

/// Per-process log file opened at creation if it exists.
pub const PROCESS_LOG_FILE: &str = "out";

/// Approximate ticks between two timer interrupts.
pub const TIMER_INTERRUPT_PERIOD: u64 = 500;

/// Runtime configuration for a kernel instance.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Physical frames available to user processes.
    pub phys_pages: usize,
    /// Stack pages given to every loaded program.
    pub stack_pages: usize,
    /// Suffix `exec` requires on image names.
    pub executable_suffix: String,
    /// File bound to a descriptor at process creation, if present in the store.
    pub process_log: Option<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            phys_pages: DEFAULT_PHYS_PAGES,
            stack_pages: STACK_PAGES,
            executable_suffix: String::from(EXECUTABLE_SUFFIX),
            process_log: Some(String::from(PROCESS_LOG_FILE)),
        }
    }
}

impl KernelConfig {
    /// Config with `phys_pages` frames and defaults elsewhere.
    pub fn with_phys_pages(phys_pages: usize) -> Self {
        Self {
            phys_pages,
            ..Self::default()
        }
    }

    /// Drop the per-process log descriptor.
    pub fn without_process_log(mut self) -> Self {
        self.process_log = None;
        self
    }
}
