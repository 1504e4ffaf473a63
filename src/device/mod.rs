//! Block Device Module
//!
//! The storage collaborator the capsule store is built on.
//!
//! ## Contract
//! - Reads are byte-granular through the device's mapped view
//! - Writes are whole blocks at a block index, nothing smaller
//! - `read_mapped` observes every `write_block` that returned `Ok`
//!
//! ```text
//! byte 0                                                capacity
//! ┌──────────┬──────────┬──────────┬─────┬──────────┐
//! │ block 0  │ block 1  │ block 2  │ ... │ block N  │
//! └──────────┴──────────┴──────────┴─────┴──────────┘
//!   read_mapped(offset, len)  → any byte range
//!   write_block(index, bytes) → exactly one block
//! ```

mod file;
mod memory;

pub use file::FileFlash;
pub use memory::MemoryFlash;

use crate::error::DeviceError;

/// Value of an erased NOR flash byte
pub const ERASED_BYTE: u8 = 0xFF;

/// A block-structured durable storage device
pub trait BlockDevice {
    /// Size in bytes of one write unit
    fn block_size(&self) -> Result<usize, DeviceError>;

    /// Total addressable bytes
    fn capacity(&self) -> u64;

    /// Copy `buf.len()` bytes starting at `offset` out of the live device.
    ///
    /// Must reflect every prior successful `write_block`.
    fn read_mapped(&self, offset: u64, buf: &mut [u8]) -> Result<(), DeviceError>;

    /// Write one full block. `block.len()` equals `block_size()`.
    fn write_block(&mut self, index: u64, block: &[u8]) -> Result<(), DeviceError>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn block_size(&self) -> Result<usize, DeviceError> {
        (**self).block_size()
    }

    fn capacity(&self) -> u64 {
        (**self).capacity()
    }

    fn read_mapped(&self, offset: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        (**self).read_mapped(offset, buf)
    }

    fn write_block(&mut self, index: u64, block: &[u8]) -> Result<(), DeviceError> {
        (**self).write_block(index, block)
    }
}

/// Bounds check shared by the device implementations
pub(crate) fn check_range(offset: u64, len: usize, capacity: u64) -> Result<(), DeviceError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(DeviceError::OutOfRange { offset, len, capacity }),
    }
}
