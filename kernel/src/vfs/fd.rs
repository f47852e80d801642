//! File Descriptor Table
//!
//! Maps small integer descriptors to open files plus a cursor. Each process
//! owns one table of [`MAX_DESCRIPTORS`] slots; a new file always takes the
//! lowest free slot.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use super::{FileSystem, OpenFile, VfsError};
use crate::config::MAX_DESCRIPTORS;

/// Descriptor table errors.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    #[error("invalid descriptor {0}")]
    InvalidDescriptor(i32),

    #[error("descriptor table full")]
    TableFull,

    #[error("file store: {0}")]
    Store(#[from] VfsError),

    #[error("user buffer not accessible")]
    BadBuffer,
}

/// One slot of the table.
#[derive(Default)]
pub struct Descriptor {
    name: String,
    file: Option<Box<dyn OpenFile>>,
    cursor: usize,
    pending_removal: bool,
}

impl Descriptor {
    /// Slot holds no file.
    pub fn is_free(&self) -> bool {
        self.file.is_none()
    }

    /// Name the file was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offset of the next read or write.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// File will be deleted when this slot closes.
    pub fn is_pending_removal(&self) -> bool {
        self.pending_removal
    }
}

/// Per-process descriptor table.
pub struct DescriptorTable {
    slots: Vec<Descriptor>,
}

impl DescriptorTable {
    /// Table with every slot free.
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_DESCRIPTORS);
        slots.resize_with(MAX_DESCRIPTORS, Descriptor::default);
        Self { slots }
    }

    fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(Descriptor::is_free)
    }

    /// Bind an already open `file` to the lowest free slot.
    pub fn install(&mut self, name: &str, mut file: Box<dyn OpenFile>) -> Result<usize, FdError> {
        let Some(fd) = self.first_free() else {
            file.close();
            return Err(FdError::TableFull);
        };
        self.slots[fd] = Descriptor {
            name: String::from(name),
            file: Some(file),
            cursor: 0,
            pending_removal: false,
        };
        Ok(fd)
    }

    /// Open (or create) `name` in `fs` and bind it to the lowest free slot.
    pub fn open(&mut self, fs: &dyn FileSystem, name: &str, create: bool) -> Result<usize, FdError> {
        if self.first_free().is_none() {
            return Err(FdError::TableFull);
        }
        let file = fs.open(name, create)?;
        self.install(name, file)
    }

    /// Slot `fd`, bound or not.
    pub fn get(&self, fd: i32) -> Option<&Descriptor> {
        usize::try_from(fd).ok().and_then(|fd| self.slots.get(fd))
    }

    fn bound_mut(&mut self, fd: i32) -> Result<&mut Descriptor, FdError> {
        usize::try_from(fd)
            .ok()
            .and_then(|index| self.slots.get_mut(index))
            .filter(|slot| !slot.is_free())
            .ok_or(FdError::InvalidDescriptor(fd))
    }

    /// Read up to `len` bytes at the cursor and hand them to `deliver`,
    /// which returns how many it accepted. The cursor advances by that many.
    pub fn read_into<F>(&mut self, fd: i32, len: usize, deliver: F) -> Result<usize, FdError>
    where
        F: FnOnce(&[u8]) -> usize,
    {
        let slot = self.bound_mut(fd)?;
        let Some(file) = slot.file.as_mut() else {
            return Err(FdError::InvalidDescriptor(fd));
        };
        let mut buf = vec![0u8; len];
        let read = file.read(slot.cursor, &mut buf)?;
        let delivered = deliver(&buf[..read]);
        if read > 0 && delivered == 0 {
            return Err(FdError::BadBuffer);
        }
        slot.cursor += delivered;
        Ok(delivered)
    }

    /// Write `data` at the cursor, advancing it by the bytes written.
    pub fn write(&mut self, fd: i32, data: &[u8]) -> Result<usize, FdError> {
        let slot = self.bound_mut(fd)?;
        let Some(file) = slot.file.as_mut() else {
            return Err(FdError::InvalidDescriptor(fd));
        };
        let written = file.write(slot.cursor, data)?;
        slot.cursor += written;
        Ok(written)
    }

    /// Close `fd`, performing a deferred removal if one is pending. The
    /// slot is freed even when that removal fails.
    pub fn close(&mut self, fs: &dyn FileSystem, fd: i32) -> Result<(), FdError> {
        let slot = self.bound_mut(fd)?;
        if let Some(mut file) = slot.file.take() {
            file.close();
        }
        slot.cursor = 0;
        let name = mem::take(&mut slot.name);
        if mem::take(&mut slot.pending_removal) {
            log::debug!("[fd] deferred removal of {}", name);
            fs.remove(&name)?;
        }
        Ok(())
    }

    /// Delete `name`, or defer the delete until close if a slot has it open.
    pub fn unlink(&mut self, fs: &dyn FileSystem, name: &str) -> Result<(), FdError> {
        let open = self
            .slots
            .iter_mut()
            .find(|slot| !slot.is_free() && !name.is_empty() && slot.name == name);
        match open {
            Some(slot) => {
                slot.pending_removal = true;
                Ok(())
            }
            None => fs.remove(name).map_err(FdError::from),
        }
    }

    /// Close every bound slot.
    pub fn close_all(&mut self, fs: &dyn FileSystem) {
        for fd in 0..self.slots.len() as i32 {
            if self.get(fd).is_some_and(|slot| !slot.is_free()) {
                if let Err(err) = self.close(fs, fd) {
                    log::warn!("[fd] closing {} on exit: {}", fd, err);
                }
            }
        }
    }

    /// Number of bound slots.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}
