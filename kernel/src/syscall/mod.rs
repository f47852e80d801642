//! System call handling module.
//!
//! Decodes traps raised by user code. A syscall trap carries its number in
//! `v0` and up to four arguments in `a0..a3`; the result goes back in `v0`
//! and the program counter steps past the trapping instruction. Any other
//! trap cause, and any unknown syscall number, is a protocol violation that
//! terminates the process.

pub mod handlers;
pub mod trace;

use alloc::sync::Arc;

use crate::kernel::Kernel;
use crate::machine::processor::{REG_A0, REG_A1, REG_A2, REG_A3, REG_V0};
use crate::machine::{Exception, Registers, TrapOutcome};
use crate::process::UserProcess;

pub use trace::SyscallStats;

/// System call numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SyscallNumber {
    /// Stop the machine. Root process only.
    Halt = 0,
    /// Terminate the calling process.
    Exit = 1,
    /// Start a child process.
    Exec = 2,
    /// Wait for a child and reap it.
    Join = 3,
    /// Open a file, creating it if missing.
    Create = 4,
    /// Open an existing file.
    Open = 5,
    /// Read from a descriptor.
    Read = 6,
    /// Write to a descriptor.
    Write = 7,
    /// Release a descriptor.
    Close = 8,
    /// Delete a file.
    Unlink = 9,
}

impl SyscallNumber {
    /// Number of defined system calls.
    pub const COUNT: usize = 10;

    pub fn name(&self) -> &'static str {
        match self {
            SyscallNumber::Halt => "halt",
            SyscallNumber::Exit => "exit",
            SyscallNumber::Exec => "exec",
            SyscallNumber::Join => "join",
            SyscallNumber::Create => "create",
            SyscallNumber::Open => "open",
            SyscallNumber::Read => "read",
            SyscallNumber::Write => "write",
            SyscallNumber::Close => "close",
            SyscallNumber::Unlink => "unlink",
        }
    }
}

impl TryFrom<i32> for SyscallNumber {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SyscallNumber::Halt),
            1 => Ok(SyscallNumber::Exit),
            2 => Ok(SyscallNumber::Exec),
            3 => Ok(SyscallNumber::Join),
            4 => Ok(SyscallNumber::Create),
            5 => Ok(SyscallNumber::Open),
            6 => Ok(SyscallNumber::Read),
            7 => Ok(SyscallNumber::Write),
            8 => Ok(SyscallNumber::Close),
            9 => Ok(SyscallNumber::Unlink),
            _ => Err(()),
        }
    }
}

/// System call context (registers at syscall time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallContext {
    /// System call number.
    pub number: i32,
    /// First argument.
    pub arg0: i32,
    /// Second argument.
    pub arg1: i32,
    /// Third argument.
    pub arg2: i32,
    /// Fourth argument.
    pub arg3: i32,
}

impl SyscallContext {
    pub fn from_registers(regs: &Registers) -> Self {
        Self {
            number: regs.read(REG_V0),
            arg0: regs.read(REG_A0),
            arg1: regs.read(REG_A1),
            arg2: regs.read(REG_A2),
            arg3: regs.read(REG_A3),
        }
    }
}

/// What the dispatcher does once a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallAction {
    /// Store the value in `v0` and resume after the trap.
    Return(i32),
    /// Do not resume the process.
    Stop(TrapOutcome),
}

/// Handle a trap raised by `process`.
pub fn handle_exception(
    kernel: &Arc<Kernel>,
    process: &Arc<UserProcess>,
    cause: Exception,
) -> TrapOutcome {
    if cause != Exception::Syscall {
        log::warn!("[syscall] pid {}: unexpected exception {:?}", process.pid(), cause);
        return protocol_violation(kernel, process);
    }

    let ctx = SyscallContext::from_registers(&process.registers());
    kernel.syscall_stats().record(ctx.number);

    #[cfg(feature = "trace-syscalls")]
    log::trace!("[syscall] pid {} -> {}", process.pid(), trace::describe(&ctx));

    let action = kernel.variant().handle_syscall(kernel, process, &ctx);

    #[cfg(feature = "trace-syscalls")]
    log::trace!("[syscall] pid {} <- {:?}", process.pid(), action);

    match action {
        SyscallAction::Return(value) => {
            let mut regs = process.registers();
            regs.write(REG_V0, value);
            regs.advance_pc();
            TrapOutcome::Resume
        }
        SyscallAction::Stop(outcome) => outcome,
    }
}

/// Terminate `process` for breaking the trap protocol.
pub fn protocol_violation(kernel: &Kernel, process: &UserProcess) -> TrapOutcome {
    log::warn!("[syscall] pid {}: protocol violation, terminating", process.pid());
    process.exit(kernel, -1)
}

/// Convert a pointer argument to a user virtual address. Negative values
/// are never valid.
pub fn user_address(raw: i32) -> Option<u32> {
    u32::try_from(raw).ok()
}
