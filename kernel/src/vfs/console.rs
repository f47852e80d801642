//! In-memory console.
//!
//! Input is a queue the embedder feeds with [`MemoryConsole::push_input`];
//! everything written shows up in [`MemoryConsole::output`].

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use super::{Console, OpenFile, VfsError};

#[derive(Default)]
struct ConsoleState {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

/// Console backed by memory buffers.
#[derive(Clone, Default)]
pub struct MemoryConsole {
    state: Arc<Mutex<ConsoleState>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue keyboard input.
    pub fn push_input(&self, bytes: &[u8]) {
        self.state.lock().input.extend(bytes.iter().copied());
    }

    /// Everything written to the display so far.
    pub fn output(&self) -> Vec<u8> {
        self.state.lock().output.clone()
    }
}

impl Console for MemoryConsole {
    fn open_for_reading(&self) -> Box<dyn OpenFile> {
        Box::new(ConsoleStream {
            name: String::from("console:in"),
            state: Some(self.state.clone()),
            writable: false,
        })
    }

    fn open_for_writing(&self) -> Box<dyn OpenFile> {
        Box::new(ConsoleStream {
            name: String::from("console:out"),
            state: Some(self.state.clone()),
            writable: true,
        })
    }
}

struct ConsoleStream {
    name: String,
    state: Option<Arc<Mutex<ConsoleState>>>,
    writable: bool,
}

impl OpenFile for ConsoleStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, _pos: usize, buf: &mut [u8]) -> Result<usize, VfsError> {
        if self.writable {
            return Err(VfsError::IoError);
        }
        let mut state = self.state.as_ref().ok_or(VfsError::Closed)?.lock();
        let amount = buf.len().min(state.input.len());
        for (slot, byte) in buf.iter_mut().zip(state.input.drain(..amount)) {
            *slot = byte;
        }
        Ok(amount)
    }

    fn write(&mut self, _pos: usize, data: &[u8]) -> Result<usize, VfsError> {
        if !self.writable {
            return Err(VfsError::IoError);
        }
        let mut state = self.state.as_ref().ok_or(VfsError::Closed)?.lock();
        state.output.extend_from_slice(data);
        Ok(data.len())
    }

    fn length(&self) -> Option<usize> {
        None
    }

    fn close(&mut self) {
        self.state = None;
    }
}
