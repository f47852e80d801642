//! Process Manager
//!
//! Lifecycle of a user process: create, load, execute, exit, join and exec.
//! Every operation takes the [`Kernel`] explicitly; there is no global
//! process state.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::context::UserThread;
use super::table::{ProcessId, ProcessState};
use super::user::UserProcess;
use crate::config::{MAX_STRING_LENGTH, PAGE_SIZE};
use crate::kernel::Kernel;
use crate::loader::{self, Coff, LoadError};
use crate::machine::TrapOutcome;
use crate::memory::AddressSpace;
use crate::scheduler::SchedulerError;
use crate::vfs::OpenFile;

/// Why `exec` refused to start a child.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("argc must be at least 1, got {0}")]
    NoArguments(i32),

    #[error("image name not readable")]
    BadName,

    #[error("image {0} lacks the executable suffix")]
    BadSuffix(String),

    #[error("argument {0} not readable")]
    BadArgument(usize),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Result of `join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Child reaped and its status stored at the caller's address.
    Joined(i32),
    /// Child reaped but its status could not be stored in full.
    ShortWrite(i32),
    /// The pid is not a child of the caller (or was already joined).
    NotChild,
    /// The child was tracked but its record is gone.
    Missing,
}

impl JoinOutcome {
    /// Value returned in `v0`.
    pub fn code(&self) -> i32 {
        match self {
            JoinOutcome::Joined(_) => 0,
            JoinOutcome::ShortWrite(_) => 1,
            JoinOutcome::NotChild => -1,
            JoinOutcome::Missing => -2,
        }
    }
}

impl UserProcess {
    /// Create a process under `parent` and register it.
    ///
    /// Descriptor 0 is console input, 1 console output; the configured log
    /// file takes descriptor 2 if it exists in the file store.
    pub fn create(kernel: &Kernel, parent: ProcessId) -> Arc<UserProcess> {
        let pid = kernel.registry().allocate_pid();
        let process = Arc::new(UserProcess::new(pid, parent));

        {
            let mut files = process.files();
            let console = kernel.console();
            if let Err(err) = files.install("", console.open_for_reading()) {
                log::warn!("[proc] pid {}: console input: {}", pid, err);
            }
            if let Err(err) = files.install("", console.open_for_writing()) {
                log::warn!("[proc] pid {}: console output: {}", pid, err);
            }
            if let Some(log_file) = kernel.config().process_log.as_deref() {
                if let Err(err) = files.open(kernel.file_system(), log_file, false) {
                    log::debug!("[proc] pid {}: no {} file: {}", pid, log_file, err);
                }
            }
        }

        kernel.registry().register(process.clone());
        log::info!("[proc] created pid {} (parent {})", pid, parent);
        process
    }

    /// Load `name` from the file store into a fresh address space and
    /// place `args` on its last page.
    ///
    /// On failure nothing is installed and every frame taken is returned.
    pub fn load(&self, kernel: &Kernel, name: &str, args: &[String]) -> Result<(), LoadError> {
        log::debug!("[loader] pid {}: load {}", self.pid(), name);

        let bytes = read_image(kernel, name)?;
        let coff = Coff::parse(&bytes)?;
        let layout = loader::plan(
            &coff,
            args,
            kernel.config().stack_pages,
            kernel.machine().num_phys_pages(),
        )?;

        let mut space = AddressSpace::allocate(kernel.frames(), layout.page_count)?;
        let loaded = {
            let mut memory = kernel.machine().memory();
            kernel
                .variant()
                .load_sections(&mut space, &coff, &mut memory)
                .and_then(|()| {
                    let argv = loader::serialize_args(args, layout.argv);
                    if space.copy_out(&mut memory, layout.argv, &argv) == argv.len() {
                        Ok(())
                    } else {
                        Err(LoadError::Malformed("argument page not writable"))
                    }
                })
        };
        if let Err(err) = loaded {
            space.release(kernel.frames());
            return Err(err);
        }

        self.install(space, layout);
        self.set_name(name);
        self.set_state(ProcessState::Loaded);
        Ok(())
    }

    /// Load `name` and start a new execution context running it.
    pub fn execute(
        self: &Arc<Self>,
        kernel: &Arc<Kernel>,
        name: &str,
        args: &[String],
    ) -> Result<(), ExecError> {
        self.load(kernel, name, args)?;

        let thread = UserThread::new(kernel.clone(), self.clone());
        if let Err(err) = kernel.scheduler().fork(name, Box::new(move || thread.run())) {
            self.release_memory(kernel.frames());
            return Err(err.into());
        }
        Ok(())
    }

    /// Terminate the process with `status`.
    ///
    /// Returns [`TrapOutcome::Halt`] for the root process, which also stops
    /// the machine, and [`TrapOutcome::Terminate`] for everyone else. The
    /// caller must not resume user code afterwards.
    pub fn exit(&self, kernel: &Kernel, status: i32) -> TrapOutcome {
        if !self.record_exit(status) {
            log::warn!("[proc] pid {} already exited", self.pid());
            return self.final_outcome();
        }

        self.files().close_all(kernel.file_system());

        let orphans = self.take_children();
        if !orphans.is_empty() && kernel.registry().get(ProcessId::ROOT).is_none() {
            log::warn!("[proc] root process gone, orphans of pid {} stay unowned", self.pid());
        }
        for child in orphans {
            if let Some(child) = kernel.registry().get(child) {
                child.set_parent(ProcessId::ROOT);
            }
        }

        self.release_memory(kernel.frames());
        self.set_state(ProcessState::Exited(status));
        log::info!("[proc] pid {} exited with status {}", self.pid(), status);

        let outcome = self.final_outcome();
        if outcome == TrapOutcome::Halt {
            log::info!("[proc] root process exited");
            kernel.terminate();
        }
        outcome
    }

    fn final_outcome(&self) -> TrapOutcome {
        if self.pid() == ProcessId::ROOT {
            TrapOutcome::Halt
        } else {
            TrapOutcome::Terminate
        }
    }

    /// Wait for child `child` to finish, store its exit status as four
    /// little-endian bytes at `status_addr`, and reap it.
    pub fn join(&self, kernel: &Kernel, child: ProcessId, status_addr: u32) -> JoinOutcome {
        if !self.remove_child(child) {
            return JoinOutcome::NotChild;
        }
        let Some(record) = kernel.registry().get(child) else {
            return JoinOutcome::Missing;
        };

        record.completion().wait(kernel.scheduler());

        let Some(status) = record.exit_status() else {
            log::error!("[proc] pid {} finished without an exit status", child);
            kernel.terminate();
            return JoinOutcome::Missing;
        };

        let written = self.write_memory(kernel.machine(), status_addr, &status.to_le_bytes());

        kernel.registry().unregister(child);
        record.set_state(ProcessState::Reaped);
        log::info!("[proc] pid {} reaped pid {} (status {})", self.pid(), child, status);

        if written == core::mem::size_of::<i32>() {
            JoinOutcome::Joined(status)
        } else {
            JoinOutcome::ShortWrite(status)
        }
    }

    /// Start image `name_addr` as a child with `argc` arguments whose
    /// pointers start at `argv_addr`. All three live in this process's
    /// memory.
    pub fn exec(
        self: &Arc<Self>,
        kernel: &Arc<Kernel>,
        name_addr: u32,
        argc: i32,
        argv_addr: u32,
    ) -> Result<ProcessId, ExecError> {
        let count = usize::try_from(argc)
            .ok()
            .filter(|&count| count >= 1)
            .ok_or(ExecError::NoArguments(argc))?;

        let name = self
            .read_string(kernel.machine(), name_addr, MAX_STRING_LENGTH)
            .ok_or(ExecError::BadName)?;
        if !name.ends_with(kernel.config().executable_suffix.as_str()) {
            return Err(ExecError::BadSuffix(name));
        }

        // Each argument takes at least a pointer and a terminator.
        if count > PAGE_SIZE / 5 {
            return Err(LoadError::ArgumentsTooLong { size: count * 5 }.into());
        }
        let args = self.read_arguments(kernel, count, argv_addr)?;

        let child = UserProcess::create(kernel, self.pid());
        self.add_child(child.pid());

        if let Err(err) = child.execute(kernel, &name, &args) {
            log::warn!("[proc] pid {}: exec {} failed: {}", self.pid(), name, err);
            self.remove_child(child.pid());
            child.files().close_all(kernel.file_system());
            kernel.registry().unregister(child.pid());
            return Err(err);
        }

        log::info!("[proc] pid {} exec {} as pid {}", self.pid(), name, child.pid());
        Ok(child.pid())
    }

    fn read_arguments(
        &self,
        kernel: &Kernel,
        count: usize,
        argv_addr: u32,
    ) -> Result<Vec<String>, ExecError> {
        let machine = kernel.machine();
        (0..count)
            .map(|index| {
                let pointer = argv_addr
                    .checked_add((index * 4) as u32)
                    .and_then(|addr| self.read_word(machine, addr))
                    .ok_or(ExecError::BadArgument(index))?;
                self.read_string(machine, pointer, MAX_STRING_LENGTH)
                    .ok_or(ExecError::BadArgument(index))
            })
            .collect()
    }
}

/// Whole contents of `name` from the file store.
fn read_image(kernel: &Kernel, name: &str) -> Result<Vec<u8>, LoadError> {
    let mut file = kernel
        .file_system()
        .open(name, false)
        .map_err(|_| LoadError::NotFound(String::from(name)))?;
    let contents = read_all(file.as_mut());
    file.close();
    contents.map_err(|err| {
        log::debug!("[loader] reading {}: {}", name, err);
        LoadError::NotFound(format!("{} ({})", name, err))
    })
}

fn read_all(file: &mut dyn OpenFile) -> Result<Vec<u8>, crate::vfs::VfsError> {
    let mut contents = Vec::with_capacity(file.length().unwrap_or(PAGE_SIZE));
    let mut chunk = [0u8; PAGE_SIZE];
    loop {
        let read = file.read(contents.len(), &mut chunk)?;
        if read == 0 {
            return Ok(contents);
        }
        contents.extend_from_slice(&chunk[..read]);
    }
}
