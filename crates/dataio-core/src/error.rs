//! Unified error types for the dataio core.
//!
//! Most remote failures never reach a caller: the reconciliation loop
//! absorbs them and retries. What surfaces here is only what a caller can
//! actually act on.

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by map and registry operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// A store round-trip that runs synchronously with the caller failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The name is already registered with different key/value types.
    #[error("map {name:?} is already registered with different key/value types")]
    TypeMismatch { name: String },
}

/// Result type alias for dataio operations.
pub type SyncResult<T> = Result<T, SyncError>;
