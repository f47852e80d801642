//! User process record.
//!
//! Everything the kernel keeps for one user process: identity, family,
//! address space, descriptors, saved registers and exit bookkeeping.
//! Lifecycle operations live in [`manager`](super::manager).

use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::{Mutex, MutexGuard, Once};

use super::table::{ProcessId, ProcessState};
use crate::loader::ProgramLayout;
use crate::machine::processor::{REG_A0, REG_A1, REG_SP};
use crate::machine::{Machine, Registers};
use crate::memory::{AddressSpace, FrameAllocator};
use crate::sync::Completion;
use crate::vfs::DescriptorTable;

/// Process control block.
///
/// Lock order: `files`, then `space`, then the machine's physical memory.
/// `space` is never held while taking `files`.
pub struct UserProcess {
    pid: ProcessId,
    parent: AtomicU32,
    name: Mutex<String>,
    state: Mutex<ProcessState>,
    children: Mutex<Vec<ProcessId>>,
    exit_status: Once<i32>,
    space: Mutex<AddressSpace>,
    files: Mutex<DescriptorTable>,
    registers: Mutex<Registers>,
    layout: Mutex<Option<ProgramLayout>>,
    completion: Completion,
}

impl UserProcess {
    /// Bare record with no program and no open files.
    pub fn new(pid: ProcessId, parent: ProcessId) -> Self {
        Self {
            pid,
            parent: AtomicU32::new(parent.0),
            name: Mutex::new(String::new()),
            state: Mutex::new(ProcessState::Created),
            children: Mutex::new(Vec::new()),
            exit_status: Once::new(),
            space: Mutex::new(AddressSpace::empty()),
            files: Mutex::new(DescriptorTable::new()),
            registers: Mutex::new(Registers::new()),
            layout: Mutex::new(None),
            completion: Completion::new(),
        }
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn parent(&self) -> ProcessId {
        ProcessId(self.parent.load(Ordering::Acquire))
    }

    pub(super) fn set_parent(&self, parent: ProcessId) {
        self.parent.store(parent.0, Ordering::Release);
    }

    /// Name of the loaded image; empty before load.
    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub(super) fn set_name(&self, name: &str) {
        *self.name.lock() = String::from(name);
    }

    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    pub(super) fn set_state(&self, state: ProcessState) {
        *self.state.lock() = state;
    }

    /// PIDs of children not yet joined, in creation order.
    pub fn children(&self) -> Vec<ProcessId> {
        self.children.lock().clone()
    }

    pub(super) fn add_child(&self, child: ProcessId) {
        self.children.lock().push(child);
    }

    /// Remove `child` from the children set. `false` if it was not there.
    pub(super) fn remove_child(&self, child: ProcessId) -> bool {
        let mut children = self.children.lock();
        match children.iter().position(|&pid| pid == child) {
            Some(index) => {
                children.remove(index);
                true
            }
            None => false,
        }
    }

    pub(super) fn take_children(&self) -> Vec<ProcessId> {
        core::mem::take(&mut *self.children.lock())
    }

    /// Exit status, once the process has exited.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status.get().copied()
    }

    /// Record the exit status. Only the first call has any effect.
    pub(super) fn record_exit(&self, status: i32) -> bool {
        let mut first = false;
        self.exit_status.call_once(|| {
            first = true;
            status
        });
        first
    }

    pub fn has_exited(&self) -> bool {
        self.exit_status.is_completed()
    }

    /// Signal raised when the execution context finishes.
    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    /// Descriptor table.
    pub fn files(&self) -> MutexGuard<'_, DescriptorTable> {
        self.files.lock()
    }

    /// Saved user registers.
    pub fn registers(&self) -> MutexGuard<'_, Registers> {
        self.registers.lock()
    }

    /// Layout of the loaded program.
    pub fn layout(&self) -> Option<ProgramLayout> {
        *self.layout.lock()
    }

    pub(super) fn install(&self, space: AddressSpace, layout: ProgramLayout) {
        *self.space.lock() = space;
        *self.layout.lock() = Some(layout);
    }

    /// Pages mapped in the address space.
    pub fn page_count(&self) -> usize {
        self.space.lock().page_count()
    }

    /// Bytes of virtual memory the process can address.
    pub fn address_space_size(&self) -> usize {
        self.page_count() * crate::config::PAGE_SIZE
    }

    /// Physical frames held by the address space, in page order.
    pub fn frames(&self) -> Vec<u32> {
        self.space
            .lock()
            .entries()
            .iter()
            .filter(|entry| entry.is_valid())
            .map(|entry| entry.ppn)
            .collect()
    }

    /// Give every frame back to `frames`.
    pub(super) fn release_memory(&self, frames: &FrameAllocator) {
        self.space.lock().release(frames);
    }

    /// Set the registers for a fresh start at the program's entry point:
    /// everything zero except PC, SP, `a0` = argc and `a1` = argv.
    pub fn init_registers(&self) {
        let Some(layout) = self.layout() else {
            log::warn!("[proc] pid {} has no program to start", self.pid);
            return;
        };
        let mut regs = self.registers.lock();
        regs.clear();
        regs.jump(layout.initial_pc as i32);
        regs.write(REG_SP, layout.initial_sp as i32);
        regs.write(REG_A0, layout.argc as i32);
        regs.write(REG_A1, layout.argv as i32);
    }

    /// Copy user memory at `vaddr` into `buf`. Returns bytes copied.
    pub fn read_memory(&self, machine: &Machine, vaddr: u32, buf: &mut [u8]) -> usize {
        let mut space = self.space.lock();
        let memory = machine.memory();
        space.copy_in(&memory, vaddr, buf)
    }

    /// Bytes of the `len` starting at `vaddr` that user writes can reach.
    pub fn writable_len(&self, vaddr: u32, len: usize) -> usize {
        self.space.lock().writable_len(vaddr, len)
    }

    /// Copy `data` into user memory at `vaddr`. Returns bytes copied.
    pub fn write_memory(&self, machine: &Machine, vaddr: u32, data: &[u8]) -> usize {
        let mut space = self.space.lock();
        let mut memory = machine.memory();
        space.copy_out(&mut memory, vaddr, data)
    }

    /// NUL-terminated string at `vaddr`, at most `max_length` bytes long
    /// counting the terminator.
    pub fn read_string(&self, machine: &Machine, vaddr: u32, max_length: usize) -> Option<String> {
        let mut space = self.space.lock();
        let memory = machine.memory();
        space.read_string(&memory, vaddr, max_length)
    }

    /// Little-endian 32-bit word at `vaddr`.
    pub fn read_word(&self, machine: &Machine, vaddr: u32) -> Option<u32> {
        let mut bytes = [0u8; 4];
        (self.read_memory(machine, vaddr, &mut bytes) == bytes.len())
            .then(|| u32::from_le_bytes(bytes))
    }
}

impl core::fmt::Debug for UserProcess {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserProcess")
            .field("pid", &self.pid)
            .field("parent", &self.parent())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
