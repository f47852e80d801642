//! Executable loading
//!
//! [`ExecutableImage`] and [`LoadableSection`] are the contract between the
//! kernel and an image parser. [`coff`] parses the COFF images the machine
//! runs; [`program`] turns an image plus an argument list into a memory
//! layout and initial register values.
//!
//! # Layout
//!
//! ```text
//! page 0 ..              sections, contiguous from page 0
//! .. + stack pages       stack, SP starts at the top
//! last page              argv pointers followed by argument strings
//! ```

pub mod coff;
pub mod program;

use alloc::string::String;
use alloc::vec::Vec;

use crate::memory::MemoryError;

pub use coff::{Coff, CoffSection, ImageBuilder, SectionKind};
pub use program::{plan, serialize_args, ProgramLayout};

/// One page-aligned loadable segment of an image.
pub trait LoadableSection {
    /// Section name, for diagnostics.
    fn name(&self) -> &str;

    /// First virtual page the section occupies.
    fn first_vpn(&self) -> u32;

    /// Number of pages the section occupies.
    fn page_count(&self) -> u32;

    /// Whether the section's pages must reject writes.
    fn is_read_only(&self) -> bool;

    /// Fill `frame` with page `spn` of the section, zero-padding past the
    /// section's contents.
    fn load_page(&self, spn: u32, frame: &mut [u8]) -> Result<(), LoadError>;
}

/// A parsed executable.
pub trait ExecutableImage {
    /// Initial program counter.
    fn entry_point(&self) -> u32;

    /// Loadable sections in image order.
    fn sections(&self) -> Vec<&dyn LoadableSection>;
}

/// Loader errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("executable {0} not found")]
    NotFound(String),

    #[error("malformed image: {0}")]
    Malformed(&'static str),

    #[error("fragmented executable: section at page {first_vpn}, expected page {expected}")]
    Fragmented { first_vpn: u32, expected: u32 },

    #[error("arguments need {size} bytes, more than one page")]
    ArgumentsTooLong { size: usize },

    #[error("program needs {needed} pages, machine has {available}")]
    InsufficientMemory { needed: usize, available: usize },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}
