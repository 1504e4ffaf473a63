//! Error types for the capsule store
//!
//! `CapsuleError` is what callers of the store see. `DeviceError` is what a
//! `BlockDevice` implementation reports; the store folds it into the
//! `CapsuleError` taxonomy before returning.

use thiserror::Error;

/// Result type alias using CapsuleError
pub type Result<T> = std::result::Result<T, CapsuleError>;

/// Unified error type for capsule store operations
#[derive(Debug, Error)]
pub enum CapsuleError {
    // -------------------------------------------------------------------------
    // Device Errors
    // -------------------------------------------------------------------------
    #[error("Block device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Storage write failed: {0}")]
    StorageWrite(String),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Capsule store is corrupt: {0}")]
    CorruptStore(String),

    #[error("Buffer too small: {required} bytes required")]
    BufferTooSmall { required: usize },

    // -------------------------------------------------------------------------
    // Capsule Errors
    // -------------------------------------------------------------------------
    #[error("Invalid capsule: {0}")]
    InvalidCapsule(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for CapsuleError {
    fn from(e: bincode::Error) -> Self {
        CapsuleError::Serialization(e.to_string())
    }
}

/// Errors reported by a block device implementation
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("access out of range: offset {offset}, len {len}, capacity {capacity}")]
    OutOfRange { offset: u64, len: usize, capacity: u64 },

    #[error("block write failed: {0}")]
    WriteFailed(String),

    #[error("device not ready: {0}")]
    NotReady(String),
}
