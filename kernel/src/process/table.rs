//! Process Table
//!
//! The registry of every process record the kernel still tracks, from
//! creation until its parent reaps it.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use hashbrown::HashMap;
use spin::RwLock;

use super::UserProcess;

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// Parent of the root process.
    pub const NONE: ProcessId = ProcessId(0);

    /// Root process ID (always 1). Its exit halts the machine and it adopts
    /// orphans.
    pub const ROOT: ProcessId = ProcessId(1);

    /// Build from a syscall argument. Negative values name no process.
    pub fn from_i32(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(ProcessId)
    }

    /// Value returned to user code.
    pub fn as_i32(&self) -> i32 {
        self.0 as i32
    }
}

impl core::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Record exists, no program loaded
    Created,
    /// Address space built, execution context not yet running
    Loaded,
    /// Execution context running user code
    Running,
    /// Exited; record kept until the parent joins (zombie)
    Exited(i32),
    /// Joined by the parent and removed from the registry
    Reaped,
}

/// Lightweight snapshot of a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub pid: ProcessId,
    pub parent: ProcessId,
    pub state: ProcessState,
}

/// All live and zombie processes, indexed by PID.
pub struct ProcessRegistry {
    next_pid: AtomicU32,
    processes: RwLock<HashMap<ProcessId, Arc<UserProcess>>>,
}

impl ProcessRegistry {
    /// Empty registry; the first PID handed out is [`ProcessId::ROOT`].
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(ProcessId::ROOT.0),
            processes: RwLock::new(HashMap::new()),
        }
    }

    /// Next unused PID. PIDs are never reused.
    pub fn allocate_pid(&self) -> ProcessId {
        ProcessId(self.next_pid.fetch_add(1, Ordering::SeqCst))
    }

    /// Add a process.
    pub fn register(&self, process: Arc<UserProcess>) {
        self.processes.write().insert(process.pid(), process);
    }

    /// Remove a process.
    pub fn unregister(&self, pid: ProcessId) -> Option<Arc<UserProcess>> {
        self.processes.write().remove(&pid)
    }

    /// Look up a process.
    pub fn get(&self, pid: ProcessId) -> Option<Arc<UserProcess>> {
        self.processes.read().get(&pid).cloned()
    }

    /// Number of registered processes.
    pub fn count(&self) -> usize {
        self.processes.read().len()
    }

    /// Snapshot of every registered process, ordered by PID.
    pub fn snapshot(&self) -> Vec<ProcessSnapshot> {
        let mut list: Vec<ProcessSnapshot> = self
            .processes
            .read()
            .values()
            .map(|process| ProcessSnapshot {
                pid: process.pid(),
                parent: process.parent(),
                state: process.state(),
            })
            .collect();
        list.sort_by_key(|snapshot| snapshot.pid);
        list
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}
