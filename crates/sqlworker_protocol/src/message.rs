//! Envelopes exchanged between client and engine.

use crate::config::EngineConfig;
use crate::key::{QueryKey, TransactionKey};
use crate::statement::{ResultSet, Statement};
use crate::value::Value;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Step of a transaction session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionAction {
    /// Open the transaction.
    Begin,
    /// Make its statements durable.
    Commit,
    /// Discard its statements.
    Rollback,
}

/// Kind of user function registered with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    /// Fire-and-forget: the engine relays arguments to the client and the
    /// SQL call yields `NULL`.
    Callback,
    /// Synchronous: the engine calls the client's handle through the
    /// function proxy and uses its return value.
    Scalar,
}

/// Why the engine (re)opened its database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectReason {
    /// First open after the handshake.
    Initial,
    /// The database file was replaced.
    Overwrite,
    /// The database file was deleted and recreated empty.
    Delete,
}

impl fmt::Display for ConnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectReason::Initial => "initial",
            ConnectReason::Overwrite => "overwrite",
            ConnectReason::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Where the engine keeps the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Private in-memory database.
    Memory,
    /// File in the durable store.
    Directory,
}

/// Database facts reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Store-relative path, `None` for in-memory databases.
    pub database_path: Option<String>,
    /// Database size (page count × page size).
    pub database_size_bytes: Option<u64>,
    /// Storage kind.
    pub storage_type: StorageType,
    /// Whether the database survives the engine.
    pub persisted: bool,
}

/// Error payload produced by the engine.
///
/// Forwarded to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct EngineError {
    /// Human-readable message.
    pub message: String,
    /// SQLite extended result code, when the failure came from SQLite.
    pub code: Option<i32>,
}

impl EngineError {
    /// Creates an error without a SQLite code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Creates an error carrying a SQLite extended result code.
    pub fn with_code(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

/// Client → engine envelope.
#[derive(Debug, Clone)]
pub enum InputMessage {
    /// One-time handshake carrying the engine configuration.
    Config(EngineConfig),
    /// Reopen the database because a sibling changed the file.
    Reinit {
        /// What the sibling did.
        reason: ConnectReason,
    },
    /// Run one statement (possibly several SQL statements).
    Query {
        /// Correlation key.
        key: QueryKey,
        /// Statement to run.
        statement: Statement,
        /// Transaction session the statement belongs to.
        transaction_key: Option<TransactionKey>,
    },
    /// Run statements atomically, one result set each.
    Batch {
        /// Correlation key.
        key: QueryKey,
        /// Statements in execution order.
        statements: Vec<Statement>,
    },
    /// Begin, commit, or roll back a transaction session.
    Transaction {
        /// Correlation key.
        key: QueryKey,
        /// Session key.
        transaction_key: TransactionKey,
        /// Step to perform.
        action: TransactionAction,
    },
    /// Register a user function by name.
    Function {
        /// Correlation key.
        key: QueryKey,
        /// SQL-visible function name.
        name: String,
        /// Function kind.
        kind: FunctionKind,
    },
    /// Replace the database file.
    Import {
        /// Correlation key.
        key: QueryKey,
        /// Complete SQLite database image.
        database: Bytes,
    },
    /// Copy the database into a new file at `target`.
    Export {
        /// Correlation key.
        key: QueryKey,
        /// Host path of the copy; must not exist yet.
        target: PathBuf,
    },
    /// Report database facts.
    GetInfo {
        /// Correlation key.
        key: QueryKey,
    },
    /// Delete the database file and reopen empty.
    Delete {
        /// Correlation key.
        key: QueryKey,
    },
    /// Close the database and stop the engine.
    Destroy {
        /// Correlation key.
        key: QueryKey,
    },
}

impl InputMessage {
    /// Returns the correlation key, if this request expects a response.
    #[must_use]
    pub fn key(&self) -> Option<QueryKey> {
        match self {
            InputMessage::Config(_) | InputMessage::Reinit { .. } => None,
            InputMessage::Query { key, .. }
            | InputMessage::Batch { key, .. }
            | InputMessage::Transaction { key, .. }
            | InputMessage::Function { key, .. }
            | InputMessage::Import { key, .. }
            | InputMessage::Export { key, .. }
            | InputMessage::GetInfo { key }
            | InputMessage::Delete { key }
            | InputMessage::Destroy { key } => Some(*key),
        }
    }

    /// Returns the transaction session this request is tagged with.
    #[must_use]
    pub fn transaction_key(&self) -> Option<TransactionKey> {
        match self {
            InputMessage::Query {
                transaction_key, ..
            } => *transaction_key,
            InputMessage::Transaction {
                transaction_key, ..
            } => Some(*transaction_key),
            _ => None,
        }
    }

    /// Returns the envelope kind for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            InputMessage::Config(_) => "config",
            InputMessage::Reinit { .. } => "reinit",
            InputMessage::Query { .. } => "query",
            InputMessage::Batch { .. } => "batch",
            InputMessage::Transaction { .. } => "transaction",
            InputMessage::Function { .. } => "function",
            InputMessage::Import { .. } => "import",
            InputMessage::Export { .. } => "export",
            InputMessage::GetInfo { .. } => "getinfo",
            InputMessage::Delete { .. } => "delete",
            InputMessage::Destroy { .. } => "destroy",
        }
    }
}

/// Engine → client envelope.
#[derive(Debug, Clone)]
pub enum OutputMessage {
    /// The request completed without data.
    Success {
        /// Correlation key of the request.
        key: QueryKey,
    },
    /// The request produced result sets.
    Data {
        /// Correlation key of the request.
        key: QueryKey,
        /// One result set per executed statement.
        results: Vec<ResultSet>,
    },
    /// The request failed, or the engine failed on its own (`key` is `None`).
    Error {
        /// Correlation key of the failed request.
        key: Option<QueryKey>,
        /// Engine payload.
        error: EngineError,
    },
    /// Database facts.
    Info {
        /// Correlation key of the request.
        key: QueryKey,
        /// Reported facts.
        info: DatabaseInfo,
    },
    /// A callback function was called from SQL.
    Callback {
        /// Registered function name.
        name: String,
        /// Call arguments.
        args: Vec<Value>,
    },
    /// The engine (re)opened its database.
    Connect {
        /// Why it did.
        reason: ConnectReason,
    },
}

impl OutputMessage {
    /// Returns the correlation key this message answers.
    #[must_use]
    pub fn key(&self) -> Option<QueryKey> {
        match self {
            OutputMessage::Success { key }
            | OutputMessage::Data { key, .. }
            | OutputMessage::Info { key, .. } => Some(*key),
            OutputMessage::Error { key, .. } => *key,
            OutputMessage::Callback { .. } | OutputMessage::Connect { .. } => None,
        }
    }

    /// Returns the envelope kind for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            OutputMessage::Success { .. } => "success",
            OutputMessage::Data { .. } => "data",
            OutputMessage::Error { .. } => "error",
            OutputMessage::Info { .. } => "info",
            OutputMessage::Callback { .. } => "callback",
            OutputMessage::Connect { .. } => "event",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_and_reinit_carry_no_key() {
        let config = InputMessage::Config(EngineConfig::new("db", "."));
        assert_eq!(config.key(), None);
        assert_eq!(config.kind(), "config");

        let reinit = InputMessage::Reinit {
            reason: ConnectReason::Overwrite,
        };
        assert_eq!(reinit.key(), None);
    }

    #[test]
    fn request_keys_are_exposed() {
        let key = QueryKey::new();
        let tx = TransactionKey::new();
        let msg = InputMessage::Query {
            key,
            statement: Statement::new("SELECT 1"),
            transaction_key: Some(tx),
        };
        assert_eq!(msg.key(), Some(key));
        assert_eq!(msg.transaction_key(), Some(tx));

        let msg = InputMessage::Transaction {
            key,
            transaction_key: tx,
            action: TransactionAction::Commit,
        };
        assert_eq!(msg.transaction_key(), Some(tx));
        assert_eq!(InputMessage::Destroy { key }.key(), Some(key));
        assert_eq!(InputMessage::GetInfo { key }.transaction_key(), None);
    }

    #[test]
    fn unsolicited_error_has_no_key() {
        let msg = OutputMessage::Error {
            key: None,
            error: EngineError::new("unable to open database file"),
        };
        assert_eq!(msg.key(), None);
        assert_eq!(msg.kind(), "error");
    }

    #[test]
    fn engine_error_display_is_message() {
        let err = EngineError::with_code("UNIQUE constraint failed: t.name", 2067);
        assert_eq!(err.to_string(), "UNIQUE constraint failed: t.name");
        assert_eq!(err.code, Some(2067));
    }

    #[test]
    fn info_serializes_lowercase_storage() {
        let info = DatabaseInfo {
            database_path: Some("app.sqlite3".into()),
            database_size_bytes: Some(4096),
            storage_type: StorageType::Directory,
            persisted: true,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["storage_type"], "directory");
        assert_eq!(ConnectReason::Overwrite.to_string(), "overwrite");
    }
}
