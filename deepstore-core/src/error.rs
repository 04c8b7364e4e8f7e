//! Error types for store operations.
//!
//! Everything in the core is synchronous and in-memory, so the only errors
//! are usage errors: writing to something that cannot be written, or asking
//! for a path accessor that cannot be built.

use thiserror::Error;

/// A usage error raised at the call site that violated the store contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The target container is read-only (for example a derived store).
    #[error("store {store} is read-only")]
    ReadOnly {
        /// Identifier of the store that rejected the write.
        store: u64,
    },

    /// A dot-path accessor could not be parsed.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The path as supplied by the caller.
        path: String,
        /// What was wrong with it.
        reason: &'static str,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
