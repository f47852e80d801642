//! Shared test fixtures: schedulers, a scripted processor and image
//! helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tkos_kernel::config::{KernelConfig, PAGE_SIZE};
use tkos_kernel::loader::{ImageBuilder, SectionKind};
use tkos_kernel::machine::processor::{REG_A0, REG_A1, REG_PC, REG_V0};
use tkos_kernel::machine::{Cpu, Exception, TrapOutcome, UserContext};
use tkos_kernel::scheduler::{Scheduler, SchedulerError};
use tkos_kernel::vfs::{MemoryConsole, RamFs};
use tkos_kernel::{Kernel, KernelBuilder};

pub const HALT: i32 = 0;
pub const EXIT: i32 = 1;
pub const EXEC: i32 = 2;
pub const JOIN: i32 = 3;
pub const CREATE: i32 = 4;
pub const OPEN: i32 = 5;
pub const READ: i32 = 6;
pub const WRITE: i32 = 7;
pub const CLOSE: i32 = 8;
pub const UNLINK: i32 = 9;

/// First byte of the stack region of a one-page program; free scratch
/// space for test programs.
pub const SCRATCH: u32 = PAGE_SIZE as u32;

/// Runs every forked body to completion before `fork` returns.
#[derive(Default)]
pub struct InlineScheduler {
    pub forks: AtomicUsize,
    pub yields: AtomicUsize,
}

impl Scheduler for InlineScheduler {
    fn fork(&self, _name: &str, body: Box<dyn FnOnce() + Send>) -> Result<(), SchedulerError> {
        self.forks.fetch_add(1, Ordering::SeqCst);
        body();
        Ok(())
    }

    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scheduler that refuses to start anything.
pub struct NoContexts;

impl Scheduler for NoContexts {
    fn fork(&self, _name: &str, _body: Box<dyn FnOnce() + Send>) -> Result<(), SchedulerError> {
        Err(SchedulerError::Unavailable)
    }

    fn yield_now(&self) {}
}

/// One OS thread per execution context.
#[derive(Default)]
pub struct ThreadScheduler {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadScheduler {
    /// Join every context started so far, including ones started while
    /// waiting.
    pub fn wait_all(&self) {
        loop {
            let handle = self.handles.lock().unwrap().pop();
            match handle {
                Some(handle) => handle.join().unwrap(),
                None => return,
            }
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn fork(&self, name: &str, body: Box<dyn FnOnce() + Send>) -> Result<(), SchedulerError> {
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|_| SchedulerError::Unavailable)?;
        self.handles.lock().unwrap().push(handle);
        Ok(())
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

/// A test program: Rust code standing in for user instructions.
pub type Program = Arc<dyn Fn(&User<'_>) + Send + Sync>;

/// Processor that runs the program registered for the entry point.
#[derive(Default)]
pub struct ScriptedCpu {
    programs: Mutex<HashMap<u32, Program>>,
}

impl ScriptedCpu {
    pub fn install(&self, entry: u32, program: Program) {
        self.programs.lock().unwrap().insert(entry, program);
    }
}

impl Cpu for ScriptedCpu {
    fn run(&self, context: &dyn UserContext) {
        let entry = context.read_register(REG_PC) as u32;
        let program = self.programs.lock().unwrap().get(&entry).cloned();
        match program {
            Some(program) => program(&User { context }),
            None => {
                context.raise(Exception::IllegalInstruction);
            }
        }
    }
}

/// Handle a program uses to talk to the kernel.
pub struct User<'a> {
    context: &'a dyn UserContext,
}

impl User<'_> {
    /// Trap into the kernel. `Err` carries the outcome when the process
    /// does not resume.
    pub fn syscall(&self, number: i32, args: &[i32]) -> Result<i32, TrapOutcome> {
        self.context.write_register(REG_V0, number);
        for (index, arg) in args.iter().enumerate() {
            self.context.write_register(REG_A0 + index, *arg);
        }
        match self.context.raise(Exception::Syscall) {
            TrapOutcome::Resume => Ok(self.context.read_register(REG_V0)),
            outcome => Err(outcome),
        }
    }

    /// Raise a non-syscall trap.
    pub fn fault(&self, cause: Exception) -> TrapOutcome {
        self.context.raise(cause)
    }

    /// Argument strings, read through argc/argv. Only meaningful before
    /// the first syscall.
    pub fn args(&self) -> Vec<String> {
        let argc = self.context.read_register(REG_A0);
        let argv = self.context.read_register(REG_A1) as u32;
        (0..argc as u32)
            .map(|index| {
                let pointer = self.word(argv + index * 4) as u32;
                self.string(pointer)
            })
            .collect()
    }

    pub fn register(&self, reg: usize) -> i32 {
        self.context.read_register(reg)
    }

    pub fn store(&self, addr: u32, data: &[u8]) -> usize {
        self.context.store(addr, data)
    }

    /// Store `s` with a terminator and return its address as a syscall
    /// argument.
    pub fn store_str(&self, addr: u32, s: &str) -> i32 {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        assert_eq!(self.store(addr, &bytes), bytes.len());
        addr as i32
    }

    pub fn load(&self, addr: u32, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        let read = self.context.load(addr, &mut buf);
        buf.truncate(read);
        buf
    }

    pub fn word(&self, addr: u32) -> i32 {
        let bytes = self.load(addr, 4);
        i32::from_le_bytes(bytes.try_into().unwrap())
    }

    pub fn string(&self, addr: u32) -> String {
        let mut bytes = Vec::new();
        let mut at = addr;
        loop {
            let byte = self.load(at, 1);
            if byte.is_empty() || byte[0] == 0 {
                return String::from_utf8(bytes).unwrap();
            }
            bytes.push(byte[0]);
            at += 1;
        }
    }

    /// `exec(name, args)`, laying the strings and argv array out in
    /// scratch memory starting at `scratch`.
    pub fn exec(&self, scratch: u32, name: &str, args: &[&str]) -> i32 {
        let name_addr = self.store_str(scratch, name);
        let mut at = scratch + 256;
        let mut pointers = Vec::new();
        for arg in args {
            pointers.push(self.store_str(at, arg));
            at += arg.len() as u32 + 1;
        }
        let argv = at;
        for (index, pointer) in pointers.iter().enumerate() {
            self.store(argv + index as u32 * 4, &pointer.to_le_bytes());
        }
        self.syscall(EXEC, &[name_addr, args.len() as i32, argv as i32])
            .unwrap()
    }

    /// `join(pid)`, returning the code and the status word stored at
    /// `status_addr`.
    pub fn join(&self, pid: i32, status_addr: u32) -> (i32, i32) {
        self.store(status_addr, &0x5A5A_5A5Au32.to_le_bytes());
        let code = self.syscall(JOIN, &[pid, status_addr as i32]).unwrap();
        (code, self.word(status_addr))
    }

    pub fn exit(&self, status: i32) -> TrapOutcome {
        self.syscall(EXIT, &[status]).unwrap_err()
    }
}

/// A COFF image whose only section is one page of text at address 0.
pub fn program_image(entry: u32) -> Vec<u8> {
    ImageBuilder::new(entry)
        .section(".text", SectionKind::Text, 0, &[0x0Cu8; 64])
        .build()
}

/// Kernel wired to in-memory collaborators.
pub struct Harness {
    pub kernel: Arc<Kernel>,
    pub fs: Arc<RamFs>,
    pub console: MemoryConsole,
    pub cpu: Arc<ScriptedCpu>,
    next_entry: AtomicU32,
}

impl Harness {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_config(scheduler, KernelConfig::default())
    }

    pub fn with_config(scheduler: Arc<dyn Scheduler>, config: KernelConfig) -> Self {
        let fs = Arc::new(RamFs::new());
        let console = MemoryConsole::new();
        let cpu = Arc::new(ScriptedCpu::default());
        let kernel = KernelBuilder::new(scheduler, cpu.clone())
            .config(config)
            .file_system(fs.clone())
            .console(Arc::new(console.clone()))
            .build();
        Self {
            kernel,
            fs,
            console,
            cpu,
            next_entry: AtomicU32::new(0x10),
        }
    }

    /// Run-to-completion scheduler, default configuration.
    pub fn inline() -> Self {
        Self::new(Arc::new(InlineScheduler::default()))
    }

    /// Store an executable called `name` that runs `program`.
    pub fn install<F>(&self, name: &str, program: F)
    where
        F: Fn(&User<'_>) + Send + Sync + 'static,
    {
        let entry = self.next_entry.fetch_add(4, Ordering::SeqCst);
        self.fs.insert(name, &program_image(entry));
        self.cpu.install(entry, Arc::new(program));
    }

    pub fn boot(&self, name: &str) -> tkos_kernel::process::ProcessId {
        self.kernel.boot(name, &[name.to_string()]).unwrap()
    }
}

/// Values recorded by test programs.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<i32>>>);

impl Log {
    pub fn push(&self, value: i32) {
        self.0.lock().unwrap().push(value);
    }

    pub fn values(&self) -> Vec<i32> {
        self.0.lock().unwrap().clone()
    }
}
