//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested file does not exist.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The path is empty, absolute, or escapes the store root.
    #[error("invalid store path: {0:?}")]
    InvalidPath(String),
}

impl StoreError {
    /// Returns true if this error means the file was missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound(_) => true,
            StoreError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            StoreError::InvalidPath(_) => false,
        }
    }
}
