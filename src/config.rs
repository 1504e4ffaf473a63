//! Configuration for the capsule store
//!
//! Describes where the capsule region lives on the device.

use crate::error::{CapsuleError, Result};

/// Region configuration for a `CapsuleStore`
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Region Placement
    // -------------------------------------------------------------------------
    /// Byte offset of the storage header on the device.
    /// Must be a multiple of the device block size.
    ///
    /// Layout from this offset:
    ///   [ StorageHeader (1 block) ][ Capsule_0 ][ Capsule_1 ] ...
    pub region_offset: u64,

    /// Total bytes reserved for the store, header block included.
    /// Must be a multiple of the device block size.
    /// No write ever lands at or past `region_offset + region_size`.
    pub region_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region_offset: 0,
            region_size: 256 * 1024, // 256 KiB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the region against a device block size
    pub fn validate(&self, block_size: usize) -> Result<()> {
        if block_size == 0 {
            return Err(CapsuleError::Config("block size must be non-zero".to_string()));
        }
        let block = block_size as u64;

        if self.region_offset % block != 0 {
            return Err(CapsuleError::Config(format!(
                "region offset {:#x} is not a multiple of block size {}",
                self.region_offset, block_size
            )));
        }

        // The last block rewritten by a splice must end at the region bound
        if self.region_size % block != 0 {
            return Err(CapsuleError::Config(format!(
                "region size {} is not a multiple of block size {}",
                self.region_size, block_size
            )));
        }

        // Header block plus at least one block of capsule data
        if self.region_size < 2 * block {
            return Err(CapsuleError::Config(format!(
                "region size {} is smaller than two blocks of {} bytes",
                self.region_size, block_size
            )));
        }

        Ok(())
    }

    /// First byte past the region
    pub fn region_end(&self) -> u64 {
        self.region_offset + self.region_size
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the region start offset (in bytes)
    pub fn region_offset(mut self, offset: u64) -> Self {
        self.config.region_offset = offset;
        self
    }

    /// Set the region size (in bytes)
    pub fn region_size(mut self, size: u64) -> Self {
        self.config.region_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
