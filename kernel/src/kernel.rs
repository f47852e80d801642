//! Kernel context
//!
//! [`Kernel`] owns every piece of process-wide state: the machine, the
//! frame pool, the process registry and the collaborators the kernel runs
//! on (file store, console, scheduler, processor). It is passed explicitly
//! to every operation that needs it.
//!
//! # Example
//!
//! ```ignore
//! let kernel = KernelBuilder::new(scheduler, cpu)
//!     .file_system(fs)
//!     .build();
//! kernel.boot("sh.coff", &[String::from("sh.coff")])?;
//! ```

use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::KernelConfig;
use crate::machine::{Cpu, Machine};
use crate::memory::FrameAllocator;
use crate::process::{
    ExecError, ProcessId, ProcessRegistry, ProcessVariant, StandardProcess, UserProcess,
};
use crate::scheduler::{Alarm, Scheduler};
use crate::syscall::SyscallStats;
use crate::vfs::{Console, FileSystem, MemoryConsole, RamFs};

/// Kernel errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("kernel already booted")]
    AlreadyBooted,

    #[error("machine halted")]
    Halted,

    #[error("root process: {0}")]
    Exec(#[from] ExecError),
}

/// Builder for a [`Kernel`].
pub struct KernelBuilder {
    config: KernelConfig,
    scheduler: Arc<dyn Scheduler>,
    cpu: Arc<dyn Cpu>,
    file_system: Option<Arc<dyn FileSystem>>,
    console: Option<Arc<dyn Console>>,
    variant: Option<Arc<dyn ProcessVariant>>,
}

impl KernelBuilder {
    /// Start from the default configuration, an empty [`RamFs`], a
    /// [`MemoryConsole`] and [`StandardProcess`].
    pub fn new(scheduler: Arc<dyn Scheduler>, cpu: Arc<dyn Cpu>) -> Self {
        Self {
            config: KernelConfig::default(),
            scheduler,
            cpu,
            file_system: None,
            console: None,
            variant: None,
        }
    }

    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(file_system);
        self
    }

    pub fn console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn variant(mut self, variant: Arc<dyn ProcessVariant>) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn build(self) -> Arc<Kernel> {
        let phys_pages = self.config.phys_pages;
        log::info!(
            "[kernel] {} physical pages of {} bytes",
            phys_pages,
            crate::config::PAGE_SIZE
        );
        Arc::new(Kernel {
            machine: Machine::new(phys_pages),
            frames: FrameAllocator::new(phys_pages),
            registry: ProcessRegistry::new(),
            file_system: self.file_system.unwrap_or_else(|| Arc::new(RamFs::new())),
            console: self.console.unwrap_or_else(|| Arc::new(MemoryConsole::new())),
            scheduler: self.scheduler,
            cpu: self.cpu,
            variant: self.variant.unwrap_or_else(|| Arc::new(StandardProcess)),
            alarm: Alarm::new(),
            syscall_stats: SyscallStats::new(),
            booted: AtomicBool::new(false),
            config: self.config,
        })
    }
}

/// The user-process kernel.
pub struct Kernel {
    config: KernelConfig,
    machine: Machine,
    frames: FrameAllocator,
    registry: ProcessRegistry,
    file_system: Arc<dyn FileSystem>,
    console: Arc<dyn Console>,
    scheduler: Arc<dyn Scheduler>,
    cpu: Arc<dyn Cpu>,
    variant: Arc<dyn ProcessVariant>,
    alarm: Alarm,
    syscall_stats: SyscallStats,
    booted: AtomicBool,
}

impl Kernel {
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn frames(&self) -> &FrameAllocator {
        &self.frames
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn file_system(&self) -> &dyn FileSystem {
        self.file_system.as_ref()
    }

    pub fn console(&self) -> &dyn Console {
        self.console.as_ref()
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }

    pub fn cpu(&self) -> &dyn Cpu {
        self.cpu.as_ref()
    }

    pub fn variant(&self) -> &dyn ProcessVariant {
        self.variant.as_ref()
    }

    pub fn alarm(&self) -> &Alarm {
        &self.alarm
    }

    pub fn syscall_stats(&self) -> &SyscallStats {
        &self.syscall_stats
    }

    /// Look up a registered process.
    pub fn process(&self, pid: ProcessId) -> Option<Arc<UserProcess>> {
        self.registry.get(pid)
    }

    /// Create the root process and start `name` in it.
    ///
    /// Only the first call creates a process; a kernel whose boot failed
    /// cannot be booted again.
    pub fn boot(self: &Arc<Self>, name: &str, args: &[String]) -> Result<ProcessId, KernelError> {
        if self.machine.is_halted() {
            return Err(KernelError::Halted);
        }
        if self.booted.swap(true, Ordering::AcqRel) {
            return Err(KernelError::AlreadyBooted);
        }

        let root = UserProcess::create(self, ProcessId::NONE);
        if let Err(err) = root.execute(self, name, args) {
            log::error!("[kernel] cannot start {}: {}", name, err);
            root.files().close_all(self.file_system());
            self.registry.unregister(root.pid());
            return Err(err.into());
        }
        log::info!("[kernel] booted {} as pid {}", name, root.pid());
        Ok(root.pid())
    }

    /// Stop the machine.
    pub fn terminate(&self) {
        self.machine.halt();
    }

    /// Advance the clock by `ticks` and wake every sleeper now due.
    /// Returns the number woken.
    pub fn timer_interrupt(&self, ticks: u64) -> usize {
        self.machine.advance_clock(ticks);
        self.alarm.timer_interrupt(&self.machine)
    }

    /// Put the calling context to sleep for at least `ticks` clock ticks.
    pub fn sleep(&self, ticks: i64) {
        self.alarm.wait_until(&self.machine, self.scheduler(), ticks);
    }
}
