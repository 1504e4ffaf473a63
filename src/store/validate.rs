//! Structural validation
//!
//! One pass over the committed capsule sequence. The header's count and
//! size must agree exactly with the lengths the capsules declare.

use crate::capsule::{HEADER_SIZE, IMAGE_SIZE_OFFSET};
use crate::device::BlockDevice;
use crate::error::{CapsuleError, Result};

use super::header::StorageHeader;
use super::Layout;

/// Check that `header` describes the capsules actually on the device
///
/// Offsets are relative to the region start; capsule data begins one block
/// in. Nothing is written.
pub fn validate<D: BlockDevice>(device: &D, layout: &Layout, header: &StorageHeader) -> Result<()> {
    let data_start = layout.block_size as u64;
    let end = data_start + header.capsule_array_size as u64;

    if end > layout.size {
        return Err(corrupt(format!(
            "capsule array of {} bytes does not fit in a {} byte region",
            header.capsule_array_size, layout.size
        )));
    }

    let mut running = data_start;
    for index in 0..header.capsule_count {
        if running + HEADER_SIZE as u64 > end {
            return Err(corrupt(format!(
                "capsule {} header at offset {} runs past array end {}",
                index, running, end
            )));
        }

        let mut field = [0u8; 4];
        device
            .read_mapped(layout.device_offset(running + IMAGE_SIZE_OFFSET as u64), &mut field)
            .map_err(|e| CapsuleError::DeviceUnavailable(e.to_string()))?;
        let declared = u32::from_le_bytes(field) as u64;

        if declared < HEADER_SIZE as u64 {
            return Err(corrupt(format!(
                "capsule {} declares {} bytes, smaller than its header",
                index, declared
            )));
        }

        if running + declared > end {
            return Err(corrupt(format!(
                "capsule {} at offset {} declares {} bytes, past array end {}",
                index, running, declared, end
            )));
        }

        running += declared;
    }

    if running != end {
        return Err(corrupt(format!(
            "{} capsules end at offset {}, header claims {}",
            header.capsule_count, running, end
        )));
    }

    Ok(())
}

fn corrupt(reason: String) -> CapsuleError {
    tracing::warn!("Capsule store validation failed: {}", reason);
    CapsuleError::CorruptStore(reason)
}
