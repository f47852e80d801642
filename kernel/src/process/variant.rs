//! Process variants.
//!
//! The operations a specialized process type may replace. Every method has
//! the standard behavior as its default, so a variant overrides only what
//! differs.

use alloc::sync::Arc;

use super::user::UserProcess;
use crate::kernel::Kernel;
use crate::loader::{ExecutableImage, LoadError};
use crate::machine::PhysicalMemory;
use crate::memory::AddressSpace;
use crate::syscall::{handlers, SyscallAction, SyscallContext};

/// Overridable capability set of a user process.
pub trait ProcessVariant: Send + Sync {
    /// Copy the image's sections into `space`. Runs once per load, before
    /// the process executes.
    fn load_sections(
        &self,
        space: &mut AddressSpace,
        image: &dyn ExecutableImage,
        memory: &mut PhysicalMemory,
    ) -> Result<(), LoadError> {
        space.apply_sections(image.sections(), memory)
    }

    /// Carry out one system call.
    fn handle_syscall(
        &self,
        kernel: &Arc<Kernel>,
        process: &Arc<UserProcess>,
        ctx: &SyscallContext,
    ) -> SyscallAction {
        handlers::dispatch(kernel, process, ctx)
    }
}

/// The default process type.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardProcess;

impl ProcessVariant for StandardProcess {}
