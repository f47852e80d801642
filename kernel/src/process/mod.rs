//! Process Management
//!
//! User processes from creation to reaping: the process record, the
//! registry that tracks every record by PID, lifecycle operations and the
//! execution context that runs user code.

pub mod context;
pub mod manager;
pub mod table;
pub mod user;
pub mod variant;

pub use context::UserThread;
pub use manager::{ExecError, JoinOutcome};
pub use table::{ProcessId, ProcessRegistry, ProcessSnapshot, ProcessState};
pub use user::UserProcess;
pub use variant::{ProcessVariant, StandardProcess};
