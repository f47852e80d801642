//! Syscall Tracing and Statistics
//!
//! Per-kernel invocation counters, plus a one-line rendering of a decoded
//! call used by the `trace-syscalls` feature.

use alloc::format;
use alloc::string::String;
use core::sync::atomic::{AtomicU64, Ordering};

use super::{SyscallContext, SyscallNumber};

/// Invocation counts, one per syscall number plus one for unknown numbers.
#[derive(Debug, Default)]
pub struct SyscallStats {
    counts: [AtomicU64; SyscallNumber::COUNT],
    unknown: AtomicU64,
}

impl SyscallStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call to `number`.
    pub fn record(&self, number: i32) {
        let counter = usize::try_from(number)
            .ok()
            .and_then(|index| self.counts.get(index))
            .unwrap_or(&self.unknown);
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Calls made to `number`.
    pub fn count(&self, number: SyscallNumber) -> u64 {
        self.counts[number as usize].load(Ordering::Relaxed)
    }

    /// Calls made with a number outside the ABI.
    pub fn unknown(&self) -> u64 {
        self.unknown.load(Ordering::Relaxed)
    }

    /// All calls, known or not.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum::<u64>()
            + self.unknown()
    }
}

/// `name(a0, a1, a2, a3)` for a decoded call.
pub fn describe(ctx: &SyscallContext) -> String {
    let name = SyscallNumber::try_from(ctx.number)
        .map(|number| String::from(number.name()))
        .unwrap_or_else(|()| format!("unknown#{}", ctx.number));
    format!(
        "{}({:#x}, {:#x}, {:#x}, {:#x})",
        name, ctx.arg0, ctx.arg1, ctx.arg2, ctx.arg3
    )
}
