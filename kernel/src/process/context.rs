//! Execution context of a user process.
//!
//! [`UserThread`] is the body the scheduler runs for each process: it hands
//! the process to the [`Cpu`](crate::machine::Cpu) and routes every trap
//! back into the kernel. When the processor stops, the process's completion
//! signal is raised so a joining parent can proceed.

use alloc::sync::Arc;

use super::table::ProcessState;
use super::user::UserProcess;
use crate::kernel::Kernel;
use crate::machine::{Exception, TrapOutcome, UserContext};
use crate::syscall;

/// The running side of a [`UserProcess`].
pub struct UserThread {
    kernel: Arc<Kernel>,
    process: Arc<UserProcess>,
}

impl UserThread {
    pub fn new(kernel: Arc<Kernel>, process: Arc<UserProcess>) -> Self {
        Self { kernel, process }
    }

    /// Run the process from its entry point until it exits.
    pub fn run(self) {
        let pid = self.process.pid();
        self.process.init_registers();
        self.process.set_state(ProcessState::Running);
        log::debug!("[proc] pid {} running {}", pid, self.process.name());

        self.kernel.cpu().run(&self);

        // Ran out of code without calling exit.
        if !self.process.has_exited() && !self.kernel.machine().is_halted() {
            log::warn!("[proc] pid {} stopped without exit", pid);
            self.process.exit(&self.kernel, 0);
        }

        self.process.completion().signal();
        log::debug!("[proc] pid {} context finished", pid);
    }
}

impl UserContext for UserThread {
    fn read_register(&self, reg: usize) -> i32 {
        self.process.registers().read(reg)
    }

    fn write_register(&self, reg: usize, value: i32) {
        self.process.registers().write(reg, value);
    }

    fn load(&self, vaddr: u32, buf: &mut [u8]) -> usize {
        self.process.read_memory(self.kernel.machine(), vaddr, buf)
    }

    fn store(&self, vaddr: u32, data: &[u8]) -> usize {
        self.process.write_memory(self.kernel.machine(), vaddr, data)
    }

    fn raise(&self, cause: Exception) -> TrapOutcome {
        if self.kernel.machine().is_halted() {
            return TrapOutcome::Halt;
        }
        if self.process.has_exited() {
            return TrapOutcome::Terminate;
        }
        syscall::handle_exception(&self.kernel, &self.process, cause)
    }
}
