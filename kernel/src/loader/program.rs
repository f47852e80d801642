//! Program layout
//!
//! Validates an image against the fixed user layout and serializes the
//! argument vector for the last page.

use alloc::string::String;
use alloc::vec::Vec;

use super::{ExecutableImage, LoadError};
use crate::config::PAGE_SIZE;

/// Bytes taken by one argv pointer.
const ARGV_POINTER_SIZE: usize = 4;

/// Memory layout of a program about to be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramLayout {
    /// Pages covered by the image's sections.
    pub section_pages: usize,
    /// Total pages: sections + stack + argument page.
    pub page_count: usize,
    /// Initial program counter.
    pub initial_pc: u32,
    /// Initial stack pointer, the top of the stack.
    pub initial_sp: u32,
    /// Number of arguments.
    pub argc: usize,
    /// Virtual address of argv[0].
    pub argv: u32,
}

/// Bytes the argument page needs for `args`.
pub fn args_size(args: &[String]) -> usize {
    args.iter()
        .map(|arg| ARGV_POINTER_SIZE + arg.len() + 1)
        .sum()
}

/// Lay out `image` with `stack_pages` of stack and `args` on the last page.
///
/// Fails if sections are not contiguous from page 0, the arguments do not
/// fit in one page, or the program needs more than `phys_pages` frames.
pub fn plan(
    image: &dyn ExecutableImage,
    args: &[String],
    stack_pages: usize,
    phys_pages: usize,
) -> Result<ProgramLayout, LoadError> {
    let mut section_pages = 0u32;
    for section in image.sections() {
        if section.first_vpn() != section_pages {
            log::debug!("[loader] fragmented executable");
            return Err(LoadError::Fragmented {
                first_vpn: section.first_vpn(),
                expected: section_pages,
            });
        }
        section_pages += section.page_count();
    }

    let size = args_size(args);
    if size > PAGE_SIZE {
        log::debug!("[loader] arguments too long ({} bytes)", size);
        return Err(LoadError::ArgumentsTooLong { size });
    }

    let section_pages = section_pages as usize;
    let stack_top = section_pages + stack_pages;
    let page_count = stack_top + 1;
    if page_count > phys_pages {
        log::debug!("[loader] insufficient physical memory");
        return Err(LoadError::InsufficientMemory {
            needed: page_count,
            available: phys_pages,
        });
    }

    Ok(ProgramLayout {
        section_pages,
        page_count,
        initial_pc: image.entry_point(),
        initial_sp: (stack_top * PAGE_SIZE) as u32,
        argc: args.len(),
        argv: (stack_top * PAGE_SIZE) as u32,
    })
}

/// Serialize `args` as they appear at `argv`: one little-endian pointer per
/// argument, then the NUL-terminated strings in order.
pub fn serialize_args(args: &[String], argv: u32) -> Vec<u8> {
    let mut pointers = Vec::with_capacity(args.len() * ARGV_POINTER_SIZE);
    let mut strings = Vec::new();
    let mut string_addr = argv + (args.len() * ARGV_POINTER_SIZE) as u32;

    for arg in args {
        pointers.extend_from_slice(&string_addr.to_le_bytes());
        strings.extend_from_slice(arg.as_bytes());
        strings.push(0);
        string_addr += arg.len() as u32 + 1;
    }

    pointers.extend_from_slice(&strings);
    pointers
}
