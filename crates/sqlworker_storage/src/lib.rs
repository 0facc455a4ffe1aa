//! # SQLWorker Storage
//!
//! Durable file store used by the SQLWorker engine and client.
//!
//! The store is an **opaque hierarchical namespace** of whole files. It
//! does not interpret the bytes it holds; SQLite owns the database format.
//!
//! ## Design Principles
//!
//! - Paths are `/`-separated, relative to the store root, and may not
//!   escape it
//! - Files are read and written whole; writes replace atomically
//! - Stores must be `Send + Sync` so the engine thread and the client can
//!   share one
//!
//! ## Example
//!
//! ```rust
//! use sqlworker_storage::{DirectoryStore, FileStore};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = DirectoryStore::new(dir.path());
//! store.write("app/data.bin", b"hello").unwrap();
//! assert_eq!(store.read("app/data.bin").unwrap(), b"hello");
//! assert!(store.remove("app/data.bin").unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod directory;
mod error;
mod path;
mod store;

pub use directory::DirectoryStore;
pub use error::{StoreError, StoreResult};
pub use path::StorePath;
pub use store::FileStore;
