//! Per-process address space.
//!
//! An [`AddressSpace`] is an ordered table of [`TranslationEntry`]s indexed
//! by virtual page number, plus ownership of the frames those entries point
//! at. All transfers between user memory and kernel buffers go through
//! [`copy_in`](AddressSpace::copy_in) / [`copy_out`](AddressSpace::copy_out),
//! which re-translate at every page boundary: consecutive virtual pages are
//! not backed by consecutive frames.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use bitflags::bitflags;

use super::{FrameAllocator, MemoryError};
use crate::config::PAGE_SIZE;
use crate::loader::{LoadError, LoadableSection};
use crate::machine::{offset_from_address, page_from_address, PhysicalMemory};

bitflags! {
    /// Translation entry state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u8 {
        /// Entry maps a frame.
        const VALID = 1 << 0;
        /// Writes are rejected.
        const READ_ONLY = 1 << 1;
        /// Page was accessed.
        const USED = 1 << 2;
        /// Page was written.
        const DIRTY = 1 << 3;
    }
}

/// Mapping record for one virtual page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationEntry {
    /// Virtual page number.
    pub vpn: u32,
    /// Physical frame number.
    pub ppn: u32,
    /// State bits.
    pub flags: EntryFlags,
}

impl TranslationEntry {
    /// Valid, writable, untouched entry.
    pub fn new(vpn: u32, ppn: u32) -> Self {
        Self {
            vpn,
            ppn,
            flags: EntryFlags::VALID,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(EntryFlags::VALID)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(EntryFlags::READ_ONLY)
    }

    pub fn is_used(&self) -> bool {
        self.flags.contains(EntryFlags::USED)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(EntryFlags::DIRTY)
    }
}

/// Kind of memory access being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Result of a successful translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    /// Frame backing the page.
    pub ppn: u32,
    /// Byte offset within the frame.
    pub offset: usize,
}

/// A process's page table and the frames it owns.
#[derive(Debug, Default)]
pub struct AddressSpace {
    table: Vec<TranslationEntry>,
}

impl AddressSpace {
    /// Address space with no pages. Every translation fails.
    pub const fn empty() -> Self {
        Self { table: Vec::new() }
    }

    /// Take `page_count` frames from `frames` and map them, writable, at
    /// virtual pages `0..page_count`.
    pub fn allocate(frames: &FrameAllocator, page_count: usize) -> Result<Self, MemoryError> {
        let ppns = frames.allocate_many(page_count)?;
        let table = ppns
            .into_iter()
            .enumerate()
            .map(|(vpn, ppn)| TranslationEntry::new(vpn as u32, ppn))
            .collect();
        Ok(Self { table })
    }

    /// Number of pages in the table.
    pub fn page_count(&self) -> usize {
        self.table.len()
    }

    /// Entry for `vpn`.
    pub fn entry(&self, vpn: u32) -> Option<&TranslationEntry> {
        self.table.get(vpn as usize)
    }

    /// All entries in page order.
    pub fn entries(&self) -> &[TranslationEntry] {
        &self.table
    }

    /// Copy loadable sections into their frames.
    ///
    /// Sections must be contiguous from page 0 and fit inside the table.
    /// Pages of a read-only section are marked read-only before its bytes
    /// are copied.
    pub fn apply_sections<'a, I>(
        &mut self,
        sections: I,
        memory: &mut PhysicalMemory,
    ) -> Result<(), LoadError>
    where
        I: IntoIterator<Item = &'a dyn LoadableSection>,
    {
        let mut next_vpn = 0u32;
        for section in sections {
            if section.first_vpn() != next_vpn {
                return Err(LoadError::Fragmented {
                    first_vpn: section.first_vpn(),
                    expected: next_vpn,
                });
            }
            let end = next_vpn + section.page_count();
            if end as usize > self.table.len() {
                return Err(LoadError::Malformed("section extends past address space"));
            }

            log::debug!(
                "[vm] initializing {} section ({} pages)",
                section.name(),
                section.page_count()
            );

            for spn in 0..section.page_count() {
                let entry = &mut self.table[(next_vpn + spn) as usize];
                entry.flags.set(EntryFlags::READ_ONLY, section.is_read_only());
                let frame = memory
                    .frame_mut(entry.ppn)
                    .ok_or(MemoryError::BadAddress(entry.ppn))?;
                section.load_page(spn, frame)?;
            }
            next_vpn = end;
        }
        Ok(())
    }

    /// Translate `vaddr` for `access`, marking the entry used (and dirty
    /// for writes) on success.
    pub fn translate(&mut self, vaddr: u32, access: Access) -> Result<Translation, MemoryError> {
        let vpn = page_from_address(vaddr);
        let entry = self
            .table
            .get_mut(vpn as usize)
            .filter(|e| e.is_valid())
            .ok_or(MemoryError::BadAddress(vaddr))?;

        if access == Access::Write && entry.is_read_only() {
            return Err(MemoryError::ReadOnlyViolation(vaddr));
        }

        entry.flags.insert(EntryFlags::USED);
        if access == Access::Write {
            entry.flags.insert(EntryFlags::DIRTY);
        }

        Ok(Translation {
            ppn: entry.ppn,
            offset: offset_from_address(vaddr),
        })
    }

    /// How many of the `len` bytes starting at `vaddr` a write could reach
    /// before hitting an invalid or read-only page. Entry bits are left
    /// untouched.
    pub fn writable_len(&self, vaddr: u32, len: usize) -> usize {
        let mut done = 0;
        while done < len {
            let Some(addr) = vaddr.checked_add(done as u32) else {
                break;
            };
            let writable = self
                .table
                .get(page_from_address(addr) as usize)
                .is_some_and(|e| e.is_valid() && !e.is_read_only());
            if !writable {
                break;
            }
            done += (PAGE_SIZE - offset_from_address(addr)).min(len - done);
        }
        done
    }

    /// Copy user memory starting at `vaddr` into `buf`.
    ///
    /// Stops at the first page that fails to translate; returns the number
    /// of bytes copied, zero for a bad starting address.
    pub fn copy_in(&mut self, memory: &PhysicalMemory, vaddr: u32, buf: &mut [u8]) -> usize {
        let mut done = 0;
        while done < buf.len() {
            let Some(addr) = vaddr.checked_add(done as u32) else {
                break;
            };
            let translation = match self.translate(addr, Access::Read) {
                Ok(t) => t,
                Err(err) => {
                    log::debug!("[vm] copy_in stopped after {} bytes: {}", done, err);
                    break;
                }
            };
            let Some(frame) = memory.frame(translation.ppn) else {
                break;
            };
            let amount = (PAGE_SIZE - translation.offset).min(buf.len() - done);
            buf[done..done + amount]
                .copy_from_slice(&frame[translation.offset..translation.offset + amount]);
            done += amount;
        }
        done
    }

    /// Copy `data` into user memory starting at `vaddr`.
    ///
    /// Rejects the whole transfer if the first page is invalid or read-only;
    /// otherwise stops at the first page that fails. Returns the number of
    /// bytes written.
    pub fn copy_out(&mut self, memory: &mut PhysicalMemory, vaddr: u32, data: &[u8]) -> usize {
        let mut done = 0;
        while done < data.len() {
            let Some(addr) = vaddr.checked_add(done as u32) else {
                break;
            };
            let translation = match self.translate(addr, Access::Write) {
                Ok(t) => t,
                Err(err) => {
                    log::debug!("[vm] copy_out stopped after {} bytes: {}", done, err);
                    break;
                }
            };
            let Some(frame) = memory.frame_mut(translation.ppn) else {
                break;
            };
            let amount = (PAGE_SIZE - translation.offset).min(data.len() - done);
            frame[translation.offset..translation.offset + amount]
                .copy_from_slice(&data[done..done + amount]);
            done += amount;
        }
        done
    }

    /// Read a NUL-terminated string of at most `max_length` bytes
    /// (terminator included). `None` if no terminator is found in range or
    /// the bytes are not UTF-8.
    pub fn read_string(
        &mut self,
        memory: &PhysicalMemory,
        vaddr: u32,
        max_length: usize,
    ) -> Option<String> {
        let mut bytes = vec![0u8; max_length];
        let read = self.copy_in(memory, vaddr, &mut bytes);
        let len = bytes[..read].iter().position(|&b| b == 0)?;
        bytes.truncate(len);
        String::from_utf8(bytes).ok()
    }

    /// Invalidate every entry and give its frame back. Safe to call more
    /// than once.
    pub fn release(&mut self, frames: &FrameAllocator) {
        for entry in self.table.iter_mut().filter(|e| e.is_valid()) {
            frames.free(entry.ppn);
            entry.flags.remove(EntryFlags::VALID);
        }
    }
}
