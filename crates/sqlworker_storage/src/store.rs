//! File store trait definition.

use crate::error::StoreResult;
use std::path::PathBuf;

/// A durable, hierarchical store of whole files.
///
/// Stores are **opaque byte stores**. They resolve names, read and write
/// whole files, and remove them. SQLite owns the database file format;
/// the store never looks inside.
///
/// # Invariants
///
/// - `write` replaces the file atomically: readers see the old bytes or
///   the new bytes, never a mix
/// - `read` returns exactly the bytes last written
/// - `remove` of a missing file is not an error
/// - Stores must be `Send + Sync`; the engine thread and the client share one
///
/// # Implementors
///
/// - [`super::DirectoryStore`] - files under a root directory
pub trait FileStore: Send + Sync {
    /// Resolves a store path to a host path the SQL engine can open.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid.
    fn resolve(&self, path: &str) -> StoreResult<PathBuf>;

    /// Reads a whole file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::NotFound`] if the file does not exist,
    /// or an I/O error.
    fn read(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Writes or replaces a whole file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn write(&self, path: &str, data: &[u8]) -> StoreResult<()>;

    /// Removes a file.
    ///
    /// Returns `true` if a file was removed, `false` if none existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn remove(&self, path: &str) -> StoreResult<bool>;

    /// Moves a file to another path, replacing any file already there.
    ///
    /// Returns `true` if a file was moved, `false` if `from` did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if either path is invalid or an I/O error occurs.
    fn rename(&self, from: &str, to: &str) -> StoreResult<bool>;

    /// Checks whether a file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid.
    fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Returns the size of a file in bytes, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn size(&self, path: &str) -> StoreResult<Option<u64>>;

    /// Creates the parent directories of a path.
    ///
    /// The engine calls this before SQLite creates a file at the path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn create_parent_dirs(&self, path: &str) -> StoreResult<()>;
}
