//! # capsule-persist
//!
//! Durable capsule storage over block-structured NOR flash:
//! - Append-only log of self-describing capsules
//! - Header-last commit ordering for crash consistency
//! - Partial-block read-modify-write on a block-write-only device
//! - Structural validation before any destructive drain
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CapsuleStore                            │
//! │            persist / retrieve_and_clear / status             │
//! └───────────────┬──────────────────────────────┬──────────────┘
//!                 │                              │
//!                 ▼                              ▼
//!         ┌──────────────┐               ┌──────────────┐
//!         │ BlockWriter  │               │  validate    │
//!         │ (RMW splice) │               │ (one pass)   │
//!         └──────┬───────┘               └──────┬───────┘
//!                │                              │
//!                └──────────────┬───────────────┘
//!                               ▼
//!                       ┌──────────────┐
//!                       │ BlockDevice  │
//!                       │ (flash part) │
//!                       └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod capsule;
pub mod device;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use capsule::Capsule;
pub use config::Config;
pub use device::{BlockDevice, FileFlash, MemoryFlash};
pub use error::{CapsuleError, DeviceError, Result};
pub use store::{CapsuleStore, Retrieved, StoreStatus};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of capsule-persist
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
