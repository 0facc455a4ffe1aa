//! Error types for the engine.

use sqlworker_protocol::{EngineError, TransactionKey};
use sqlworker_storage::StoreError;
use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors raised while handling a request.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// SQLite rejected the operation.
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The durable store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// More than one statement in a request declares parameters.
    #[error("only one statement in a multi-statement request may take parameters")]
    MultipleParameterized,

    /// Parameters were supplied but no statement declares any.
    #[error("parameters supplied but no statement takes parameters")]
    UnusedParameters,

    /// No database is open (handshake missing or reopen failed).
    #[error("database is not open")]
    NotOpen,

    /// A statement or step names a transaction that is not open.
    #[error("transaction {0} is not active")]
    TransactionNotActive(TransactionKey),

    /// A begin names a transaction that is already open.
    #[error("transaction {0} is already active")]
    TransactionActive(TransactionKey),

    /// Imported bytes are not a SQLite database.
    #[error("imported data is not a SQLite database")]
    InvalidImage,

    /// The engine thread could not be started.
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] io::Error),
}

impl WorkerError {
    /// Converts to the payload sent to the client.
    ///
    /// SQLite failures carry their extended result code.
    pub fn to_payload(&self) -> EngineError {
        match self {
            WorkerError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                EngineError::with_code(self.to_string(), err.extended_code)
            }
            _ => EngineError::new(self.to_string()),
        }
    }
}
