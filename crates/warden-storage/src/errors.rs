//! Storage error types.

use thiserror::Error;

use crate::backend::BackendKind;

/// Errors raised by storage backends.
///
/// Outside strict mode these are logged and swallowed by [`crate::Storage`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend refused the write because it is full.
    #[error("{backend} storage quota exceeded while writing '{key}'")]
    QuotaExceeded {
        /// Backend that refused.
        backend: BackendKind,
        /// Key being written.
        key: String,
    },
    /// The backend is enabled in config but the platform does not provide it.
    #[error("{0} storage is enabled in config but not available")]
    Unavailable(BackendKind),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
