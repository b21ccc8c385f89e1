//! Device interface (spec.md §6): a pluggable byte-addressable store the
//! durable layers (bucket pages, the semantic layer's name map) read and
//! write through. The in-memory device is the identity: it accepts
//! writes into a growing arena and hands back views.

pub mod log;

use crate::error::{Error, Result};
use parking_lot::RwLock;

pub trait Device: Send + Sync {
    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>>;
    fn write(&self, offset: u64, data: &[u8]) -> Result<usize>;
    fn sync(&self, offset: u64, len: usize) -> Result<()>;
    fn used(&self) -> u64;
    fn free(&self, offset: u64, len: usize) -> Result<()>;
}

/// A growing in-memory arena; `write` past the current end zero-extends.
pub struct MemDevice {
    arena: RwLock<Vec<u8>>,
}

impl MemDevice {
    pub fn new() -> Self {
        MemDevice { arena: RwLock::new(Vec::new()) }
    }
}

impl Default for MemDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for MemDevice {
    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let arena = self.arena.read();
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(Error::NoMemory)?;
        if end > arena.len() {
            return Err(Error::DataKeyNotFound);
        }
        Ok(arena[start..end].to_vec())
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<usize> {
        let mut arena = self.arena.write();
        let start = offset as usize;
        let end = start.checked_add(data.len()).ok_or(Error::NoMemory)?;
        if end > arena.len() {
            arena.resize(end, 0);
        }
        arena[start..end].copy_from_slice(data);
        Ok(data.len())
    }

    fn sync(&self, _offset: u64, _len: usize) -> Result<()> {
        Ok(())
    }

    fn used(&self) -> u64 {
        self.arena.read().len() as u64
    }

    fn free(&self, offset: u64, len: usize) -> Result<()> {
        let mut arena = self.arena.write();
        let start = offset as usize;
        let end = start.saturating_add(len).min(arena.len());
        if start < end {
            arena[start..end].iter_mut().for_each(|b| *b = 0);
        }
        Ok(())
    }
}
