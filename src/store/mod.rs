//! Store Module
//!
//! Durable append-only capsule log over a block device.
//!
//! ## Region Layout
//! ```text
//! region_offset
//! ┌────────────────────────────────────────┐
//! │ StorageHeader (1 block)                │
//! │ ┌──────────┬──────────┬──────────────┐ │
//! │ │Magic (4) │Count (4) │ ArraySize (4)│ │
//! │ ├──────────┴──────────┴──────────────┤ │
//! │ │ Reserved (20) + zero fill          │ │
//! │ └────────────────────────────────────┘ │
//! ├────────────────────────────────────────┤
//! │ Capsule_0 ‖ Capsule_1 ‖ ... ‖ Capsule_n│
//! │ (no padding between capsules)          │
//! └────────────────────────────────────────┘
//! ```
//!
//! ## Write Ordering
//! Capsule bytes always land before the header that commits them. A torn
//! append is invisible: readers only trust the header's array size.

mod header;
mod manager;
mod validate;
mod writer;

pub use header::{StorageHeader, HEADER_ENCODED_SIZE, STORE_MAGIC};
pub use manager::{CapsuleStore, Retrieved, StoreStatus};
pub use validate::validate;
pub(crate) use writer::BlockWriter;

/// Geometry of a capsule region on its device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Device byte offset of the header block
    pub base: u64,
    /// Device block size
    pub block_size: usize,
    /// Region length in bytes, header block included
    pub size: u64,
}

impl Layout {
    /// Block index of the header block
    pub fn base_block(&self) -> u64 {
        self.base / self.block_size as u64
    }

    /// Translate a region-relative offset to a device offset
    pub fn device_offset(&self, region_offset: u64) -> u64 {
        self.base + region_offset
    }

    /// Bytes available for capsule data
    pub fn data_capacity(&self) -> u64 {
        self.size - self.block_size as u64
    }
}
