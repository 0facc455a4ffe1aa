//! Client configuration.

use sqlworker_protocol::{ConnectReason, EngineConfig, Statement, MEMORY_DATABASE};
use sqlworker_storage::StorePath;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Hook called whenever the engine (re)opens the database.
pub type ConnectHook = Arc<dyn Fn(ConnectReason) + Send + Sync>;

/// Who a client's mutation lock is shared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockScope {
    /// Each client has its own lock.
    Instance,
    /// Clients in this process that use the same database share one lock.
    #[default]
    Process,
}

/// Configuration for a [`Client`](crate::Client).
#[derive(Clone)]
pub struct ClientConfig {
    /// Store-relative database path, or `":memory:"`.
    pub database_path: String,
    /// Directory the store is rooted at.
    pub storage_root: PathBuf,
    /// Open the database read-only.
    pub read_only: bool,
    /// Log every statement the engine runs.
    pub verbose: bool,
    /// Lock sharing scope.
    pub lock_scope: LockScope,
    /// Statements run after every (re)open.
    pub on_init: Vec<Statement>,
    /// Called with the reason of every (re)open.
    pub on_connect: Option<ConnectHook>,
    /// How long SQLite waits on a locked database file.
    pub busy_timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration for a database in the current directory.
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            storage_root: PathBuf::from("."),
            read_only: false,
            verbose: false,
            lock_scope: LockScope::default(),
            on_init: Vec::new(),
            on_connect: None,
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Creates a configuration for a private in-memory database.
    pub fn memory() -> Self {
        Self::new(MEMORY_DATABASE)
    }

    /// Sets the store root directory.
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    /// Opens the database read-only.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Enables per-statement engine logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets the lock scope.
    pub fn with_lock_scope(mut self, scope: LockScope) -> Self {
        self.lock_scope = scope;
        self
    }

    /// Adds a statement to run after every (re)open.
    pub fn with_on_init(mut self, statement: impl Into<Statement>) -> Self {
        self.on_init.push(statement.into());
        self
    }

    /// Sets the connect hook.
    pub fn with_on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(ConnectReason) + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(hook));
        self
    }

    /// Sets the SQLite busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Returns true for in-memory databases.
    pub fn is_memory(&self) -> bool {
        self.database_path == MEMORY_DATABASE || self.database_path.is_empty()
    }

    /// Returns the root of the durable store.
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Name shared by every client of the same database in this process.
    ///
    /// In-memory databases are private, so they have none. Roots and
    /// database paths that name the same file yield the same name.
    pub fn shared_name(&self) -> Option<String> {
        if self.is_memory() {
            return None;
        }
        let database = StorePath::parse(&self.database_path)
            .map(|path| path.to_string())
            .unwrap_or_else(|_| self.database_path.clone());
        Some(format!(
            "{}::{}",
            normalize_root(&self.storage_root).display(),
            database
        ))
    }

    /// Builds the handshake configuration for the engine.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            database_path: self.database_path.clone(),
            storage_root: self.storage_root.clone(),
            read_only: self.read_only,
            verbose: self.verbose,
            on_init: self.on_init.clone(),
            busy_timeout: self.busy_timeout,
        }
    }
}

/// Resolves `root` to an absolute path without `.`/`..` components,
/// following symlinks through its longest existing ancestor.
fn normalize_root(root: &Path) -> PathBuf {
    let absolute = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other),
        }
    }

    let mut existing = cleaned.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(existing) {
            return missing.iter().rev().fold(canonical, |path, name| path.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return cleaned,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("database_path", &self.database_path)
            .field("storage_root", &self.storage_root)
            .field("read_only", &self.read_only)
            .field("verbose", &self.verbose)
            .field("lock_scope", &self.lock_scope)
            .field("on_init", &self.on_init)
            .field("on_connect", &self.on_connect.is_some())
            .field("busy_timeout", &self.busy_timeout)
            .finish()
    }
}
