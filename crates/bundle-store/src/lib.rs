//! Bundle Store Library
//!
//! Store-carry-forward bundles and the bounded per-node buffers that hold
//! them. Each buffer is exclusively owned by its node; a bundle replica lives
//! in exactly one buffer and dies on TTL expiry, eviction, or delivery.

use thiserror::Error;

pub mod buffer;
pub mod bundle;
pub mod eviction;

pub use buffer::{BufferStats, BundleBuffer};
pub use bundle::{Bundle, BundleId, Priority};
pub use eviction::EvictionPolicy;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),
    #[error("Buffer full: {needed_bytes} bytes needed, {capacity_bytes} byte capacity")]
    BufferFull {
        needed_bytes: u64,
        capacity_bytes: u64,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
