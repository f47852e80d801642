//! Processor contract
//!
//! The instruction-level simulator lives outside this crate. It runs a
//! process's user code through the [`Cpu`] trait and reports every trap back
//! to the kernel via [`UserContext::raise`].

/// Number of user-visible registers.
pub const NUM_USER_REGISTERS: usize = 38;

/// Syscall number on entry, return value on exit.
pub const REG_V0: usize = 2;
/// Second return register.
pub const REG_V1: usize = 3;
/// First argument register.
pub const REG_A0: usize = 4;
/// Second argument register.
pub const REG_A1: usize = 5;
/// Third argument register.
pub const REG_A2: usize = 6;
/// Fourth argument register.
pub const REG_A3: usize = 7;
/// Stack pointer.
pub const REG_SP: usize = 29;
/// Return address.
pub const REG_RA: usize = 31;
/// Program counter.
pub const REG_PC: usize = 34;
/// Address of the next instruction.
pub const REG_NEXT_PC: usize = 35;
/// Cause of the last exception.
pub const REG_CAUSE: usize = 36;
/// Faulting virtual address of the last exception.
pub const REG_BAD_VADDR: usize = 37;

/// Trap causes delivered by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Exception {
    Syscall = 0,
    PageFault = 1,
    TlbMiss = 2,
    ReadOnly = 3,
    BusError = 4,
    AddressError = 5,
    Overflow = 6,
    IllegalInstruction = 7,
}

impl TryFrom<i32> for Exception {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Exception::Syscall),
            1 => Ok(Exception::PageFault),
            2 => Ok(Exception::TlbMiss),
            3 => Ok(Exception::ReadOnly),
            4 => Ok(Exception::BusError),
            5 => Ok(Exception::AddressError),
            6 => Ok(Exception::Overflow),
            7 => Ok(Exception::IllegalInstruction),
            _ => Err(()),
        }
    }
}

/// What the processor does after the kernel handled a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// Continue executing user code.
    Resume,
    /// The process is gone; stop this execution context.
    Terminate,
    /// The whole machine stopped.
    Halt,
}

/// User register file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    regs: [i32; NUM_USER_REGISTERS],
}

impl Registers {
    /// All registers zero.
    pub const fn new() -> Self {
        Self {
            regs: [0; NUM_USER_REGISTERS],
        }
    }

    /// Read register `reg`; out-of-range indices read as zero.
    pub fn read(&self, reg: usize) -> i32 {
        self.regs.get(reg).copied().unwrap_or(0)
    }

    /// Write register `reg`; out-of-range indices are ignored.
    pub fn write(&mut self, reg: usize, value: i32) {
        if let Some(slot) = self.regs.get_mut(reg) {
            *slot = value;
        }
    }

    /// Set PC and the following instruction address.
    pub fn jump(&mut self, pc: i32) {
        self.write(REG_PC, pc);
        self.write(REG_NEXT_PC, pc.wrapping_add(4));
    }

    /// Step past the instruction that trapped.
    pub fn advance_pc(&mut self) {
        let next = self.read(REG_NEXT_PC);
        self.jump(next);
    }

    /// Zero every register.
    pub fn clear(&mut self) {
        self.regs = [0; NUM_USER_REGISTERS];
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

/// The view of a running process the processor works against.
pub trait UserContext {
    /// Read a user register.
    fn read_register(&self, reg: usize) -> i32;

    /// Write a user register.
    fn write_register(&self, reg: usize, value: i32);

    /// Copy user memory at `vaddr` into `buf` through the MMU. Returns the
    /// number of bytes transferred.
    fn load(&self, vaddr: u32, buf: &mut [u8]) -> usize;

    /// Copy `data` into user memory at `vaddr` through the MMU. Returns the
    /// number of bytes transferred.
    fn store(&self, vaddr: u32, data: &[u8]) -> usize;

    /// Deliver a trap to the kernel.
    fn raise(&self, cause: Exception) -> TrapOutcome;
}

/// Instruction-level simulator.
pub trait Cpu: Send + Sync {
    /// Run user code until a trap returns something other than
    /// [`TrapOutcome::Resume`] or the program has nothing left to execute.
    fn run(&self, context: &dyn UserContext);
}
