//! Simulated machine
//!
//! The hardware the user-process layer runs on: a flat physical memory
//! divided into frames, a halt line, a tick counter driving the timer, and
//! the processor contract in [`processor`].

pub mod processor;

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use spin::{Mutex, MutexGuard};

use crate::config::PAGE_SIZE;

pub use processor::{Cpu, Exception, Registers, TrapOutcome, UserContext};

/// Virtual page number containing `vaddr`.
pub const fn page_from_address(vaddr: u32) -> u32 {
    vaddr / PAGE_SIZE as u32
}

/// Byte offset of `vaddr` within its page.
pub const fn offset_from_address(vaddr: u32) -> usize {
    vaddr as usize % PAGE_SIZE
}

/// Address of byte `offset` in page `page`.
pub const fn make_address(page: u32, offset: usize) -> u32 {
    page * PAGE_SIZE as u32 + offset as u32
}

/// Physical memory: `num_pages` frames of [`PAGE_SIZE`] bytes.
pub struct PhysicalMemory {
    bytes: Vec<u8>,
}

impl PhysicalMemory {
    /// Zero-filled memory of `num_pages` frames.
    pub fn new(num_pages: usize) -> Self {
        Self {
            bytes: vec![0; num_pages * PAGE_SIZE],
        }
    }

    /// Number of frames.
    pub fn num_pages(&self) -> usize {
        self.bytes.len() / PAGE_SIZE
    }

    /// Contents of frame `ppn`, or `None` past the end of memory.
    pub fn frame(&self, ppn: u32) -> Option<&[u8]> {
        let start = ppn as usize * PAGE_SIZE;
        self.bytes.get(start..start + PAGE_SIZE)
    }

    /// Mutable contents of frame `ppn`, or `None` past the end of memory.
    pub fn frame_mut(&mut self, ppn: u32) -> Option<&mut [u8]> {
        let start = ppn as usize * PAGE_SIZE;
        self.bytes.get_mut(start..start + PAGE_SIZE)
    }

    /// Raw view of all of memory.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

/// The simulated machine.
pub struct Machine {
    memory: Mutex<PhysicalMemory>,
    halted: AtomicBool,
    ticks: AtomicU64,
}

impl Machine {
    /// Build a machine with `phys_pages` frames of memory.
    pub fn new(phys_pages: usize) -> Self {
        Self {
            memory: Mutex::new(PhysicalMemory::new(phys_pages)),
            halted: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
        }
    }

    /// Lock physical memory.
    pub fn memory(&self) -> MutexGuard<'_, PhysicalMemory> {
        self.memory.lock()
    }

    /// Number of physical frames.
    pub fn num_phys_pages(&self) -> usize {
        self.memory.lock().num_pages()
    }

    /// Stop the machine. Every execution context observes the halt the next
    /// time it traps.
    pub fn halt(&self) {
        if !self.halted.swap(true, Ordering::SeqCst) {
            log::info!("[machine] halted at tick {}", self.now());
        }
    }

    /// Whether [`halt`](Self::halt) has been called.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Current machine time in ticks.
    pub fn now(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Advance the clock, returning the new time.
    pub fn advance_clock(&self, ticks: u64) -> u64 {
        self.ticks.fetch_add(ticks, Ordering::SeqCst) + ticks
    }
}
