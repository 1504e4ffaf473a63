//! File-backed flash image
//!
//! Treats a regular file as a flash part. Every block write is synced to
//! disk before `write_block` returns.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::DeviceError;

use super::{check_range, BlockDevice, ERASED_BYTE};

/// Flash device stored in a file
///
/// The file handle sits behind a Mutex so `read_mapped` can seek while
/// only holding `&self`.
pub struct FileFlash {
    /// Image path (for diagnostics)
    path: PathBuf,
    /// Image file handle
    file: Mutex<File>,
    /// Size of one write unit
    block_size: usize,
    /// Image length in bytes
    capacity: u64,
}

impl FileFlash {
    /// Create a new erased image of `capacity` bytes, replacing any existing file
    pub fn create(path: &Path, capacity: u64, block_size: usize) -> Result<Self, DeviceError> {
        Self::check_geometry(capacity, block_size)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let erased = vec![ERASED_BYTE; block_size];
        for _ in 0..capacity / block_size as u64 {
            file.write_all(&erased)?;
        }
        file.sync_all()?;

        tracing::debug!("Created flash image {} ({} bytes)", path.display(), capacity);

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            block_size,
            capacity,
        })
    }

    /// Open an existing image
    pub fn open(path: &Path, block_size: usize) -> Result<Self, DeviceError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let capacity = file.metadata()?.len();
        Self::check_geometry(capacity, block_size)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            block_size,
            capacity,
        })
    }

    /// Image path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_geometry(capacity: u64, block_size: usize) -> Result<(), DeviceError> {
        if block_size == 0 {
            return Err(DeviceError::NotReady("block size must be non-zero".to_string()));
        }
        if capacity == 0 || capacity % block_size as u64 != 0 {
            return Err(DeviceError::NotReady(format!(
                "image size {} is not a whole number of {} byte blocks",
                capacity, block_size
            )));
        }
        Ok(())
    }
}

impl BlockDevice for FileFlash {
    fn block_size(&self) -> Result<usize, DeviceError> {
        Ok(self.block_size)
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn read_mapped(&self, offset: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        check_range(offset, buf.len(), self.capacity)?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
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
        check_range(offset, block.len(), self.capacity)?;

        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(block)?;
        file.sync_data()?;
        Ok(())
    }
}
