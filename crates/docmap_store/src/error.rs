//! Error types for store clients.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the backing store.
///
/// Not-found conditions are **not** errors at this boundary: `get` returns
/// `Ok(None)` and `delete` of an absent key returns `Ok(())`. `StoreError`
/// is reserved for failures of the store itself (connectivity, backend
/// faults), which the core layer propagates unchanged except where the
/// documented contract downgrades them (entity delete).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed to serve the request.
    #[error("store backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
