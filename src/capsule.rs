//! Capsule Module
//!
//! Self-describing firmware capsules. The store only ever looks at one field
//! of a capsule, the total image size, to know how far to skip.
//!
//! ## Header Format (28 bytes, little endian)
//! ```text
//! ┌─────────────────┬───────────────┬───────────┬───────────────────┐
//! │ Guid (16)       │ HeaderSize(4) │ Flags (4) │ ImageSize (4)     │
//! └─────────────────┴───────────────┴───────────┴───────────────────┘
//!   ImageSize = header + payload, in bytes
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CapsuleError, Result};

/// Encoded size of `CapsuleHeader`
pub const HEADER_SIZE: usize = 28;

/// Byte offset of `capsule_image_size` within a capsule
pub const IMAGE_SIZE_OFFSET: usize = 24;

/// Firmware processes the capsule after system reset
pub const PERSIST_ACROSS_RESET: u32 = 1 << 16;

/// Capsule is coalesced and published in the system table after reset
pub const POPULATE_SYSTEM_TABLE: u32 = 1 << 17;

/// Firmware resets the system after accepting the capsule
pub const INITIATE_RESET: u32 = 1 << 18;

/// Common header at the start of every capsule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapsuleHeader {
    /// Type of data in the capsule
    pub capsule_guid: [u8; 16],
    /// Header bytes before the payload (may exceed HEADER_SIZE for typed capsules)
    pub header_size: u32,
    /// Capsule update flags
    pub flags: u32,
    /// Total capsule length, header included
    pub capsule_image_size: u32,
}

impl CapsuleHeader {
    /// Serialize to the 28 byte wire form
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Parse from the first 28 bytes of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CapsuleError::InvalidCapsule(format!(
                "need {} header bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        Ok(bincode::deserialize(&bytes[..HEADER_SIZE])?)
    }
}

/// Read the declared total length of the capsule starting at `bytes[0]`
///
/// Returns None if `bytes` is too short to hold the length field.
pub fn declared_length(bytes: &[u8]) -> Option<u32> {
    let field = bytes.get(IMAGE_SIZE_OFFSET..IMAGE_SIZE_OFFSET + 4)?;
    Some(u32::from_le_bytes(field.try_into().ok()?))
}

/// A well-formed capsule: its declared image size matches its byte length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capsule {
    header: CapsuleHeader,
    bytes: Vec<u8>,
}

impl Capsule {
    /// Build a capsule around `payload`
    pub fn new(guid: [u8; 16], flags: u32, payload: &[u8]) -> Result<Self> {
        let total = HEADER_SIZE + payload.len();
        let capsule_image_size = u32::try_from(total).map_err(|_| {
            CapsuleError::InvalidCapsule(format!("capsule of {} bytes exceeds u32", total))
        })?;

        let header = CapsuleHeader {
            capsule_guid: guid,
            header_size: HEADER_SIZE as u32,
            flags,
            capsule_image_size,
        };

        let mut bytes = header.encode()?;
        bytes.extend_from_slice(payload);

        Ok(Self { header, bytes })
    }

    /// Validate and take ownership of an already encoded capsule
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let header = CapsuleHeader::decode(&bytes)?;

        if header.capsule_image_size as usize != bytes.len() {
            return Err(CapsuleError::InvalidCapsule(format!(
                "declared image size {} but buffer holds {} bytes",
                header.capsule_image_size,
                bytes.len()
            )));
        }

        if (header.header_size as usize) < HEADER_SIZE
            || header.header_size > header.capsule_image_size
        {
            return Err(CapsuleError::InvalidCapsule(format!(
                "header size {} outside [{}, {}]",
                header.header_size, HEADER_SIZE, header.capsule_image_size
            )));
        }

        Ok(Self { header, bytes })
    }

    pub fn header(&self) -> &CapsuleHeader {
        &self.header
    }

    /// Bytes after the header
    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.header.header_size as usize..]
    }

    /// Full encoded capsule
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Walk the capsules packed back-to-back in `buf`
pub fn capsules(buf: &[u8]) -> CapsuleIter<'_> {
    CapsuleIter { buf, pos: 0, failed: false }
}

/// Iterator over packed capsules, in storage order
///
/// Stops after the first malformed capsule.
pub struct CapsuleIter<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Iterator for CapsuleIter<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }

        let rest = &self.buf[self.pos..];
        let len = match declared_length(rest) {
            Some(len) => len as usize,
            None => {
                self.failed = true;
                return Some(Err(CapsuleError::InvalidCapsule(format!(
                    "truncated capsule header at offset {}",
                    self.pos
                ))));
            }
        };

        if len < HEADER_SIZE || len > rest.len() {
            self.failed = true;
            return Some(Err(CapsuleError::InvalidCapsule(format!(
                "capsule at offset {} declares {} bytes, {} available",
                self.pos,
                len,
                rest.len()
            ))));
        }

        self.pos += len;
        Some(Ok(&rest[..len]))
    }
}
