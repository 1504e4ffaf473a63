//! Storage header codec
//!
//! The header owns the first block of the region. Only the first 32 bytes
//! carry data; the rest of the block is zero filled on every write.

use serde::{Deserialize, Serialize};

use crate::error::{CapsuleError, Result};

/// Sentinel marking an initialized store ("CPST" little endian)
pub const STORE_MAGIC: u32 = u32::from_le_bytes(*b"CPST");

/// Encoded size of the header fields: magic, count, size, 5 reserved words
pub const HEADER_ENCODED_SIZE: usize = 32;

/// Header record at the start of the capsule region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageHeader {
    /// STORE_MAGIC when the region has been initialized
    pub magic: u32,
    /// Number of committed capsules
    pub capsule_count: u32,
    /// Bytes of committed capsule data after the header block
    pub capsule_array_size: u32,
    /// Zero filled
    pub reserved: [u32; 5],
}

impl StorageHeader {
    /// Initialized header describing an empty store
    pub fn empty() -> Self {
        Self::with_contents(0, 0)
    }

    /// Initialized header for `count` capsules totalling `size` bytes
    pub fn with_contents(count: u32, size: u32) -> Self {
        Self {
            magic: STORE_MAGIC,
            capsule_count: count,
            capsule_array_size: size,
            reserved: [0; 5],
        }
    }

    /// Whether the magic matches; anything else is an uninitialized region
    pub fn is_initialized(&self) -> bool {
        self.magic == STORE_MAGIC
    }

    /// Encode into a full block, zero padded
    pub fn encode_block(&self, block_size: usize) -> Result<Vec<u8>> {
        if block_size < HEADER_ENCODED_SIZE {
            return Err(CapsuleError::Config(format!(
                "block size {} cannot hold a {} byte header",
                block_size, HEADER_ENCODED_SIZE
            )));
        }

        let mut block = vec![0u8; block_size];
        let fields = bincode::serialize(self)?;
        block[..fields.len()].copy_from_slice(&fields);
        Ok(block)
    }

    /// Decode from the leading bytes of the header block
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_ENCODED_SIZE {
            return Err(CapsuleError::Serialization(format!(
                "need {} header bytes, got {}",
                HEADER_ENCODED_SIZE,
                bytes.len()
            )));
        }
        Ok(bincode::deserialize(&bytes[..HEADER_ENCODED_SIZE])?)
    }
}
