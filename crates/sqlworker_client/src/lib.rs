//! # SQLWorker Client
//!
//! Async client for a SQLite database running on a background worker.
//!
//! Each [`Client`] drives one engine thread over an ordered message
//! channel. Requests are matched to replies by correlation key, mutations
//! are serialized through a mutation lock, and transactions hold that lock
//! exclusively from begin to commit or rollback.
//!
//! ## Features
//!
//! - Single statements, multi-statement SQL and atomic batches
//! - Explicit and structured transactions with automatic rollback
//! - Callback and scalar user functions
//! - Whole-file export, import and delete, with sibling clients of the
//!   same database told to reopen
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlworker_client::{Client, ClientConfig, Value};
//!
//! # async fn example() -> sqlworker_client::ClientResult<()> {
//! let client = Client::connect(ClientConfig::new("groceries.sqlite3").with_storage_root("data"));
//!
//! client
//!     .query("CREATE TABLE IF NOT EXISTS groceries (id INTEGER PRIMARY KEY, name TEXT)", [])
//!     .await?;
//!
//! client
//!     .transaction(|tx| async move {
//!         tx.query("INSERT INTO groceries (name) VALUES (?)", [Value::from("bread")]).await?;
//!         tx.query("INSERT INTO groceries (name) VALUES (?)", [Value::from("milk")]).await?;
//!         Ok(())
//!     })
//!     .await?;
//!
//! let rows = client.query("SELECT name FROM groceries ORDER BY id", []).await?;
//! assert_eq!(rows.len(), 2);
//!
//! client.destroy();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod broadcast;
mod client;
mod config;
mod error;
mod functions;
mod lock;
mod registry;
mod transaction;

pub use broadcast::ReinitNotice;
pub use client::{Client, DatabaseFile};
pub use config::{ClientConfig, ConnectHook, LockScope};
pub use error::{ClientError, ClientResult};
pub use functions::{CallbackFn, ScalarFn};
pub use lock::{LockMode, LockTicket, MutationLock};
pub use transaction::{Transaction, TransactionScope, TransactionState};

pub use sqlworker_protocol::{
    ClientKey, ConnectReason, DatabaseInfo, EngineError, Method, Record, ResultSet, Statement,
    StorageType, TransactionKey, Value,
};
