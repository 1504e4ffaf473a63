//! RAM-backed flash
//!
//! Simulates a NOR part in memory, with write fault injection for
//! crash-consistency testing.

use crate::error::DeviceError;

use super::{check_range, BlockDevice, ERASED_BYTE};

/// In-memory flash device
///
/// Starts fully erased (`0xFF`). Write faults are armed with
/// [`fail_writes_after`](Self::fail_writes_after); once armed, the given
/// number of block writes succeed and every write after that fails until
/// [`clear_faults`](Self::clear_faults) is called.
#[derive(Debug, Clone)]
pub struct MemoryFlash {
    /// Raw device contents
    data: Vec<u8>,
    /// Size of one write unit
    block_size: usize,
    /// Successful writes left before failures start (None = never fail)
    writes_until_failure: Option<usize>,
    /// Number of successful block writes since creation
    write_count: u64,
    /// Whether the device answers at all
    ready: bool,
}

impl MemoryFlash {
    /// Create an erased device of `block_count` blocks
    pub fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            data: vec![ERASED_BYTE; block_size * block_count],
            block_size,
            writes_until_failure: None,
            write_count: 0,
            ready: true,
        }
    }

    /// Load a device from a raw image, e.g. a copy of a flash dump
    pub fn from_image(block_size: usize, image: Vec<u8>) -> Result<Self, DeviceError> {
        if block_size == 0 || image.is_empty() || image.len() % block_size != 0 {
            return Err(DeviceError::NotReady(format!(
                "image of {} bytes is not a whole number of {} byte blocks",
                image.len(),
                block_size
            )));
        }

        Ok(Self {
            data: image,
            block_size,
            writes_until_failure: None,
            write_count: 0,
            ready: true,
        })
    }

    /// Let `successful` more block writes through, then fail every write
    pub fn fail_writes_after(&mut self, successful: usize) {
        self.writes_until_failure = Some(successful);
    }

    /// Disarm write fault injection
    pub fn clear_faults(&mut self) {
        self.writes_until_failure = None;
    }

    /// Mark the device present or absent
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Number of successful block writes so far
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// Raw view of the whole device
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Overwrite raw bytes, bypassing block granularity (simulates bit rot)
    pub fn corrupt(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl BlockDevice for MemoryFlash {
    fn block_size(&self) -> Result<usize, DeviceError> {
        if !self.ready {
            return Err(DeviceError::NotReady("memory flash detached".to_string()));
        }
        Ok(self.block_size)
    }

    fn capacity(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_mapped(&self, offset: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        if !self.ready {
            return Err(DeviceError::NotReady("memory flash detached".to_string()));
        }
        check_range(offset, buf.len(), self.capacity())?;

        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn write_block(&mut self, index: u64, block: &[u8]) -> Result<(), DeviceError> {
        if block.len() != self.block_size {
            return Err(DeviceError::WriteFailed(format!(
                "expected {} byte block, got {}",
                self.block_size,
                block.len()
            )));
        }

        let offset = index * self.block_size as u64;
        check_range(offset, block.len(), self.capacity())?;

        match self.writes_until_failure {
            Some(0) => {
                return Err(DeviceError::WriteFailed(format!(
                    "injected fault at block {}",
                    index
                )));
            }
            Some(ref mut left) => *left -= 1,
            None => {}
        }

        let start = offset as usize;
        self.data[start..start + block.len()].copy_from_slice(block);
        self.write_count += 1;
        Ok(())
    }
}
