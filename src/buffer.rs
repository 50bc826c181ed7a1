//! Trampoline code buffer.

use crate::error::{LinkError, Result};

/// Upper bound on a generated trampoline. The longest sequence any supported
/// architecture emits stays well below it.
pub const TRAMPOLINE_CAPACITY: usize = 100;

/// A bounded, write-only byte buffer for one trampoline. All supported ISAs are
/// little-endian, so multi-byte values are written little-endian.
#[derive(Debug, Clone)]
pub struct TrampolineBuffer {
    code: Vec<u8>,
    capacity: usize,
}

impl TrampolineBuffer {
    pub fn new() -> Self {
        Self::with_capacity(TRAMPOLINE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            code: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.code.len() + bytes.len() > self.capacity {
            return Err(LinkError::BufferOverflow {
                capacity: self.capacity,
            });
        }
        self.code.extend_from_slice(bytes);
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.put_bytes(&[value])
    }

    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_u64(&mut self, value: u64) -> Result<()> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The bytes written so far, not the full capacity.
    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.code
    }
}

impl Default for TrampolineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
