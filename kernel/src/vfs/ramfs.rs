//! In-memory file store.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::HashMap;
use spin::Mutex;

use super::{FileSystem, OpenFile, VfsError};

type FileData = Arc<Mutex<Vec<u8>>>;

/// File store keeping every file in memory.
///
/// Removing a file drops its name; handles already open keep their data.
#[derive(Default)]
pub struct RamFs {
    files: Mutex<HashMap<String, FileData>>,
}

impl RamFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace `name` with `contents`.
    pub fn insert(&self, name: &str, contents: &[u8]) {
        self.files
            .lock()
            .insert(String::from(name), Arc::new(Mutex::new(contents.to_vec())));
    }

    /// Whether `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    /// Copy of the contents of `name`.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(name).map(|data| data.lock().clone())
    }
}

impl FileSystem for RamFs {
    fn open(&self, name: &str, create: bool) -> Result<Box<dyn OpenFile>, VfsError> {
        let mut files = self.files.lock();
        let existing = files.get(name).cloned();
        let data = match existing {
            Some(data) => data,
            None if create => {
                let data = FileData::default();
                files.insert(String::from(name), data.clone());
                data
            }
            None => return Err(VfsError::NotFound),
        };
        Ok(Box::new(RamFile {
            name: String::from(name),
            data: Some(data),
        }))
    }

    fn remove(&self, name: &str) -> Result<(), VfsError> {
        self.files
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or(VfsError::NotFound)
    }
}

struct RamFile {
    name: String,
    data: Option<FileData>,
}

impl OpenFile for RamFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, pos: usize, buf: &mut [u8]) -> Result<usize, VfsError> {
        let data = self.data.as_ref().ok_or(VfsError::Closed)?.lock();
        if pos >= data.len() {
            return Ok(0);
        }
        let amount = buf.len().min(data.len() - pos);
        buf[..amount].copy_from_slice(&data[pos..pos + amount]);
        Ok(amount)
    }

    fn write(&mut self, pos: usize, bytes: &[u8]) -> Result<usize, VfsError> {
        let mut data = self.data.as_ref().ok_or(VfsError::Closed)?.lock();
        let end = pos + bytes.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[pos..end].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    fn length(&self) -> Option<usize> {
        self.data.as_ref().map(|data| data.lock().len())
    }

    fn close(&mut self) {
        self.data = None;
    }
}
