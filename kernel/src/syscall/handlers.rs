//! System call handlers.
//!
//! One handler per syscall number. Handlers never fail outward: every
//! error becomes the integer sentinel the user ABI defines, usually -1.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;

use super::{protocol_violation, user_address, SyscallAction, SyscallContext, SyscallNumber};
use crate::config::MAX_STRING_LENGTH;
use crate::kernel::Kernel;
use crate::machine::TrapOutcome;
use crate::process::{ProcessId, UserProcess};

/// Carry out the call described by `ctx` for `process`.
pub fn dispatch(
    kernel: &Arc<Kernel>,
    process: &Arc<UserProcess>,
    ctx: &SyscallContext,
) -> SyscallAction {
    let Ok(number) = SyscallNumber::try_from(ctx.number) else {
        log::warn!("[syscall] pid {}: unknown syscall {}", process.pid(), ctx.number);
        return SyscallAction::Stop(protocol_violation(kernel, process));
    };

    match number {
        SyscallNumber::Halt => handle_halt(kernel, process),
        SyscallNumber::Exit => SyscallAction::Stop(process.exit(kernel, ctx.arg0)),
        SyscallNumber::Exec => SyscallAction::Return(handle_exec(kernel, process, ctx)),
        SyscallNumber::Join => SyscallAction::Return(handle_join(kernel, process, ctx)),
        SyscallNumber::Create => SyscallAction::Return(handle_open(kernel, process, ctx, true)),
        SyscallNumber::Open => SyscallAction::Return(handle_open(kernel, process, ctx, false)),
        SyscallNumber::Read => SyscallAction::Return(handle_read(kernel, process, ctx)),
        SyscallNumber::Write => SyscallAction::Return(handle_write(kernel, process, ctx)),
        SyscallNumber::Close => SyscallAction::Return(handle_close(kernel, process, ctx)),
        SyscallNumber::Unlink => SyscallAction::Return(handle_unlink(kernel, process, ctx)),
    }
}

/// Stop the machine.
fn handle_halt(kernel: &Kernel, process: &UserProcess) -> SyscallAction {
    if process.pid() != ProcessId::ROOT {
        log::warn!("[syscall] pid {}: halt from non-root process", process.pid());
        return SyscallAction::Stop(protocol_violation(kernel, process));
    }
    log::info!("[syscall] halt requested by root process");
    kernel.terminate();
    SyscallAction::Stop(TrapOutcome::Halt)
}

/// Start a child: `a0` image name, `a1` argc, `a2` argv.
fn handle_exec(kernel: &Arc<Kernel>, process: &Arc<UserProcess>, ctx: &SyscallContext) -> i32 {
    let (Some(name), Some(argv)) = (user_address(ctx.arg0), user_address(ctx.arg2)) else {
        return -1;
    };
    match process.exec(kernel, name, ctx.arg1, argv) {
        Ok(pid) => pid.as_i32(),
        Err(err) => {
            log::warn!("[syscall] pid {}: exec: {}", process.pid(), err);
            -1
        }
    }
}

/// Wait for child `a0` and store its status at `a1`.
fn handle_join(kernel: &Kernel, process: &UserProcess, ctx: &SyscallContext) -> i32 {
    let Some(child) = ProcessId::from_i32(ctx.arg0) else {
        return -1;
    };
    // A negative status pointer still reaps the child; the store then
    // comes up short.
    let status_addr = user_address(ctx.arg1).unwrap_or(u32::MAX);
    process.join(kernel, child, status_addr).code()
}

/// Open (`create` set: or create) the file named at `a0`.
fn handle_open(kernel: &Kernel, process: &UserProcess, ctx: &SyscallContext, create: bool) -> i32 {
    let Some(name) = read_name(kernel, process, ctx.arg0) else {
        return -1;
    };
    match process.files().open(kernel.file_system(), &name, create) {
        Ok(fd) => fd as i32,
        Err(err) => {
            log::warn!("[syscall] pid {}: open {}: {}", process.pid(), name, err);
            -1
        }
    }
}

/// Read up to `a2` bytes from descriptor `a0` into the buffer at `a1`.
fn handle_read(kernel: &Kernel, process: &UserProcess, ctx: &SyscallContext) -> i32 {
    let (Some(buffer), Ok(count)) = (user_address(ctx.arg1), usize::try_from(ctx.arg2)) else {
        return -1;
    };
    // Stream reads consume input, so read no more than the buffer takes.
    let writable = process.writable_len(buffer, count.min(process.address_space_size()));
    if writable == 0 && count > 0 {
        log::warn!("[syscall] pid {}: read into bad buffer {:#x}", process.pid(), buffer);
        return -1;
    }
    let count = writable;
    let machine = kernel.machine();
    let result = process
        .files()
        .read_into(ctx.arg0, count, |bytes| process.write_memory(machine, buffer, bytes));
    match result {
        Ok(read) => read as i32,
        Err(err) => {
            log::warn!("[syscall] pid {}: read fd {}: {}", process.pid(), ctx.arg0, err);
            -1
        }
    }
}

/// Write `a2` bytes from the buffer at `a1` to descriptor `a0`.
fn handle_write(kernel: &Kernel, process: &UserProcess, ctx: &SyscallContext) -> i32 {
    let (Some(buffer), Ok(count)) = (user_address(ctx.arg1), usize::try_from(ctx.arg2)) else {
        return -1;
    };
    let mut data = vec![0u8; count.min(process.address_space_size())];
    let copied = process.read_memory(kernel.machine(), buffer, &mut data);
    if copied == 0 && count > 0 {
        log::warn!("[syscall] pid {}: write from bad buffer {:#x}", process.pid(), buffer);
        return -1;
    }
    match process.files().write(ctx.arg0, &data[..copied]) {
        Ok(written) => written as i32,
        Err(err) => {
            log::warn!("[syscall] pid {}: write fd {}: {}", process.pid(), ctx.arg0, err);
            -1
        }
    }
}

/// Release descriptor `a0`.
fn handle_close(kernel: &Kernel, process: &UserProcess, ctx: &SyscallContext) -> i32 {
    match process.files().close(kernel.file_system(), ctx.arg0) {
        Ok(()) => 0,
        Err(err) => {
            log::warn!("[syscall] pid {}: close fd {}: {}", process.pid(), ctx.arg0, err);
            -1
        }
    }
}

/// Delete the file named at `a0`, deferred while this process has it open.
fn handle_unlink(kernel: &Kernel, process: &UserProcess, ctx: &SyscallContext) -> i32 {
    let Some(name) = read_name(kernel, process, ctx.arg0) else {
        return -1;
    };
    match process.files().unlink(kernel.file_system(), &name) {
        Ok(()) => 0,
        Err(err) => {
            log::warn!("[syscall] pid {}: unlink {}: {}", process.pid(), name, err);
            -1
        }
    }
}

fn read_name(kernel: &Kernel, process: &UserProcess, raw: i32) -> Option<String> {
    let addr = user_address(raw)?;
    let name = process.read_string(kernel.machine(), addr, MAX_STRING_LENGTH);
    if name.is_none() {
        log::warn!("[syscall] pid {}: bad file name at {:#x}", process.pid(), addr);
    }
    name
}
