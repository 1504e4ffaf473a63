//! Block-aligned writer
//!
//! The device only writes whole blocks. Writes that start or end inside a
//! block read the block back, splice the new bytes in, and write the whole
//! block, so neighbouring bytes that already belong to committed data
//! survive.
//!
//! ```text
//!            block k               block k+1             block k+2
//!  ┌─────────────┬────────┐┌──────────────────────┐┌──────┬───────────────┐
//!  │  preserved  │  head  ││        full          ││ tail │   preserved   │
//!  └─────────────┴────────┘└──────────────────────┘└──────┴───────────────┘
//!   read+splice+write        direct write            read+splice+write
//! ```

use crate::device::BlockDevice;
use crate::error::{CapsuleError, Result};

use super::Layout;

/// Splices arbitrary byte ranges onto a block-write-only device
pub struct BlockWriter {
    /// One block of scratch space for read-modify-write
    scratch: Vec<u8>,
    layout: Layout,
}

impl BlockWriter {
    pub(crate) fn new(layout: Layout) -> Self {
        Self {
            scratch: vec![0u8; layout.block_size],
            layout,
        }
    }

    /// Write `data` at `region_offset` bytes into the region
    ///
    /// Returns the number of blocks written. A failed block write stops the
    /// operation; blocks written before it stay written.
    pub fn write_at<D: BlockDevice>(
        &mut self,
        device: &mut D,
        data: &[u8],
        region_offset: u64,
    ) -> Result<usize> {
        let end = region_offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= self.layout.size)
            .ok_or_else(|| {
                CapsuleError::StorageWrite(format!(
                    "write of {} bytes at region offset {} exceeds region size {}",
                    data.len(),
                    region_offset,
                    self.layout.size
                ))
            })?;

        let block_size = self.layout.block_size;
        let mut block_index = region_offset / block_size as u64 + self.layout.base_block();
        let mut head = (region_offset % block_size as u64) as usize;
        let mut written = 0usize;
        let mut blocks = 0usize;

        while written < data.len() {
            let chunk = (block_size - head).min(data.len() - written);
            let src = &data[written..written + chunk];

            if head == 0 && chunk == block_size {
                device.write_block(block_index, src).map_err(|e| {
                    CapsuleError::StorageWrite(format!("block {}: {}", block_index, e))
                })?;
            } else {
                device
                    .read_mapped(block_index * block_size as u64, &mut self.scratch)
                    .map_err(|e| {
                        CapsuleError::DeviceUnavailable(format!(
                            "read-back of block {}: {}",
                            block_index, e
                        ))
                    })?;
                self.scratch[head..head + chunk].copy_from_slice(src);
                device.write_block(block_index, &self.scratch).map_err(|e| {
                    CapsuleError::StorageWrite(format!("block {}: {}", block_index, e))
                })?;
            }

            tracing::trace!(
                block = block_index,
                head,
                len = chunk,
                "wrote block"
            );

            written += chunk;
            block_index += 1;
            head = 0;
            blocks += 1;
        }

        debug_assert_eq!(region_offset + written as u64, end);
        Ok(blocks)
    }
}
