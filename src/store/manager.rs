//! Capsule Store
//!
//! Public append and drain operations over one capsule region.
//!
//! ## Responsibilities
//! - Lazily initialize the header on first append
//! - Append capsules behind the committed array, then commit the header
//! - Validate structure before handing data back
//! - Logically clear the store after a drain

use crate::capsule::Capsule;
use crate::config::Config;
use crate::device::BlockDevice;
use crate::error::{CapsuleError, Result};

use super::header::{StorageHeader, HEADER_ENCODED_SIZE};
use super::validate::validate;
use super::{BlockWriter, Layout};

/// Outcome of a successful `retrieve_and_clear`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Retrieved {
    /// Capsules copied out
    pub count: u32,
    /// Bytes copied into the destination buffer
    pub len: usize,
}

impl Retrieved {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Read-only view of the store state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// Header magic absent: nothing was ever persisted
    Uninitialized,
    /// Header valid and structure consistent
    Ready {
        capsule_count: u32,
        capsule_array_size: u32,
        free_bytes: u64,
    },
}

/// Append-only capsule log over a block device
///
/// ## Concurrency
/// None. Mutating operations take `&mut self` and callers serialize access
/// to the underlying region. The header is re-read from the device on every
/// call; nothing but the scratch block is kept between calls.
pub struct CapsuleStore<D: BlockDevice> {
    device: D,
    config: Config,
    layout: Layout,
    writer: BlockWriter,
}

impl<D: BlockDevice> CapsuleStore<D> {
    /// Bind a store to `device` at the region described by `config`
    ///
    /// Discovers the block size once and checks the region fits the device.
    pub fn open(device: D, config: Config) -> Result<Self> {
        let block_size = device
            .block_size()
            .map_err(|e| CapsuleError::DeviceUnavailable(e.to_string()))?;

        if block_size == 0 {
            return Err(CapsuleError::DeviceUnavailable(
                "device reports a zero block size".to_string(),
            ));
        }
        if block_size < HEADER_ENCODED_SIZE {
            return Err(CapsuleError::Config(format!(
                "block size {} cannot hold the {} byte storage header",
                block_size, HEADER_ENCODED_SIZE
            )));
        }

        config.validate(block_size)?;

        if config.region_end() > device.capacity() {
            return Err(CapsuleError::DeviceUnavailable(format!(
                "region [{:#x}, {:#x}) exceeds device capacity {:#x}",
                config.region_offset,
                config.region_end(),
                device.capacity()
            )));
        }

        let layout = Layout {
            base: config.region_offset,
            block_size,
            size: config.region_size,
        };

        tracing::debug!(
            region_offset = config.region_offset,
            region_size = config.region_size,
            block_size,
            "Opened capsule store"
        );

        Ok(Self {
            device,
            config,
            layout,
            writer: BlockWriter::new(layout),
        })
    }

    /// Append one capsule
    ///
    /// Capsule bytes are written first, the header commit last. If the
    /// commit fails the capsule stays invisible and the next append reuses
    /// its space.
    pub fn persist(&mut self, capsule: &Capsule) -> Result<()> {
        self.device
            .block_size()
            .map_err(|e| CapsuleError::DeviceUnavailable(e.to_string()))?;

        let mut header = self.read_header()?;
        if !header.is_initialized() {
            header = StorageHeader::empty();
            self.write_header(&header)?;
            tracing::debug!("Initialized capsule store header at {:#x}", self.layout.base);
        }

        let len = capsule.len() as u64;
        let append_at = self.layout.block_size as u64 + header.capsule_array_size as u64;
        let new_size = header.capsule_array_size as u64 + len;

        if append_at + len > self.layout.size || new_size > u32::MAX as u64 {
            return Err(CapsuleError::StorageWrite(format!(
                "capsule of {} bytes does not fit: {} of {} data bytes in use",
                len,
                header.capsule_array_size,
                self.layout.data_capacity()
            )));
        }

        let new_count = header.capsule_count.checked_add(1).ok_or_else(|| {
            CapsuleError::StorageWrite("capsule count overflow".to_string())
        })?;

        self.writer
            .write_at(&mut self.device, capsule.as_bytes(), append_at)?;

        let committed = StorageHeader::with_contents(new_count, new_size as u32);
        self.write_header(&committed)?;

        tracing::debug!(
            count = new_count,
            size = new_size,
            "Persisted capsule of {} bytes",
            len
        );

        Ok(())
    }

    /// Copy every committed capsule into `dest`, then clear the store
    ///
    /// `dest.len()` is the capacity. On `BufferTooSmall` the store is left
    /// untouched. If the clearing header write fails the data has already
    /// been copied and a later call returns it again.
    pub fn retrieve_and_clear(&mut self, dest: &mut [u8]) -> Result<Retrieved> {
        let header = self.read_header()?;
        if !header.is_initialized() {
            return Ok(Retrieved::default());
        }

        validate(&self.device, &self.layout, &header)?;

        if header.capsule_array_size == 0 {
            return Ok(Retrieved::default());
        }

        let size = header.capsule_array_size as usize;
        if size > dest.len() {
            return Err(CapsuleError::BufferTooSmall { required: size });
        }

        self.device
            .read_mapped(
                self.layout.device_offset(self.layout.block_size as u64),
                &mut dest[..size],
            )
            .map_err(|e| CapsuleError::DeviceUnavailable(e.to_string()))?;

        self.write_header(&StorageHeader::empty())?;

        tracing::debug!(
            count = header.capsule_count,
            size,
            "Drained capsule store"
        );

        Ok(Retrieved {
            count: header.capsule_count,
            len: size,
        })
    }

    /// Retrieve and clear into a freshly sized buffer
    pub fn drain(&mut self) -> Result<(u32, Vec<u8>)> {
        let header = self.read_header()?;
        if !header.is_initialized() {
            return Ok((0, Vec::new()));
        }

        // A size past the region is rejected by validation before any copy
        let size = (header.capsule_array_size as u64).min(self.layout.data_capacity());
        let mut buf = vec![0u8; size as usize];

        let retrieved = self.retrieve_and_clear(&mut buf)?;
        buf.truncate(retrieved.len);
        Ok((retrieved.count, buf))
    }

    /// Inspect the store without modifying it
    pub fn status(&self) -> Result<StoreStatus> {
        let header = self.read_header()?;
        if !header.is_initialized() {
            return Ok(StoreStatus::Uninitialized);
        }

        validate(&self.device, &self.layout, &header)?;

        Ok(StoreStatus::Ready {
            capsule_count: header.capsule_count,
            capsule_array_size: header.capsule_array_size,
            free_bytes: self.layout.data_capacity() - header.capsule_array_size as u64,
        })
    }

    /// Logically clear the store, discarding every committed capsule
    pub fn erase(&mut self) -> Result<()> {
        self.write_header(&StorageHeader::empty())?;
        tracing::debug!("Erased capsule store at {:#x}", self.layout.base);
        Ok(())
    }

    /// Current header as stored on the device
    pub fn header(&self) -> Result<StorageHeader> {
        self.read_header()
    }

    pub fn block_size(&self) -> usize {
        self.layout.block_size
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Release the device
    pub fn into_inner(self) -> D {
        self.device
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn read_header(&self) -> Result<StorageHeader> {
        let mut raw = [0u8; HEADER_ENCODED_SIZE];
        self.device
            .read_mapped(self.layout.base, &mut raw)
            .map_err(|e| CapsuleError::DeviceUnavailable(e.to_string()))?;
        StorageHeader::decode(&raw)
    }

    fn write_header(&mut self, header: &StorageHeader) -> Result<()> {
        let block = header.encode_block(self.layout.block_size)?;
        self.writer.write_at(&mut self.device, &block, 0)?;
        Ok(())
    }
}
