//! Engine configuration carried by the handshake.

use crate::statement::Statement;
use std::path::PathBuf;
use std::time::Duration;

/// Database path that selects a private in-memory database.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Configuration sent to the engine in the initial `Config` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Store-relative database path, or [`MEMORY_DATABASE`].
    pub database_path: String,
    /// Root directory of the durable file store.
    pub storage_root: PathBuf,
    /// Open the database read-only.
    pub read_only: bool,
    /// Log every statement the engine runs.
    pub verbose: bool,
    /// Statements run after every (re)open, before the connect event.
    pub on_init: Vec<Statement>,
    /// How long SQLite waits on a locked file before failing.
    pub busy_timeout: Duration,
}

impl EngineConfig {
    /// Creates a configuration for `database_path` under `storage_root`.
    pub fn new(database_path: impl Into<String>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            storage_root: storage_root.into(),
            read_only: false,
            verbose: false,
            on_init: Vec::new(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Returns true if this names an in-memory database.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.database_path == MEMORY_DATABASE || self.database_path.is_empty()
    }
}
