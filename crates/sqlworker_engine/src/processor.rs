//! Request processor owning the SQLite connection.

use crate::convert::{from_sql, to_sql};
use crate::error::{WorkerError, WorkerResult};
use crate::exec::run_statement;
use crate::SQLITE_HEADER;
use bytes::Bytes;
use rusqlite::backup::Backup;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::{Connection, OpenFlags};
use sqlworker_protocol::{
    ConnectReason, DatabaseInfo, EngineConfig, FunctionKind, FunctionProxy, InputMessage,
    OutputMessage, OutputSender, QueryKey, ResultSet, Statement, StorageType, TransactionAction,
    TransactionKey, Value,
};
use sqlworker_storage::{DirectoryStore, FileStore, StoreError};
use std::collections::VecDeque;
use std::fs;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Files SQLite may keep next to a database.
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// How far a file swap got before it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwapStage {
    Untouched,
    NoPrevious,
    SetAside,
}

/// Whether the request loop keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// Handles requests one at a time against a single connection.
pub(crate) struct Processor {
    output: OutputSender,
    proxy: Arc<dyn FunctionProxy>,
    config: Option<EngineConfig>,
    store: Option<DirectoryStore>,
    conn: Option<Connection>,
    functions: Vec<(String, FunctionKind)>,
    active: Option<TransactionKey>,
    deferred: VecDeque<InputMessage>,
}

impl Processor {
    pub(crate) fn new(output: OutputSender, proxy: Arc<dyn FunctionProxy>) -> Self {
        Self {
            output,
            proxy,
            config: None,
            store: None,
            conn: None,
            functions: Vec::new(),
            active: None,
            deferred: VecDeque::new(),
        }
    }

    /// Handles one request, deferring it if another session is open.
    pub(crate) fn handle(&mut self, message: InputMessage) -> Flow {
        if self.must_defer(&message) {
            debug!(kind = message.kind(), "deferring request until transaction settles");
            self.deferred.push_back(message);
            return Flow::Continue;
        }

        match message {
            InputMessage::Config(config) => self.configure(config),
            InputMessage::Reinit { reason } => self.reinit(reason),
            InputMessage::Query {
                key,
                statement,
                transaction_key,
            } => {
                let result = self.query(&statement, transaction_key);
                self.reply(key, result.map(|set| vec![set]));
            }
            InputMessage::Batch { key, statements } => {
                let result = self.batch(&statements);
                self.reply(key, result);
            }
            InputMessage::Transaction {
                key,
                transaction_key,
                action,
            } => {
                let result = self.transaction(transaction_key, action);
                self.acknowledge(key, result);
                if self.active.is_none() && !self.deferred.is_empty() {
                    return self.drain_deferred();
                }
            }
            InputMessage::Function { key, name, kind } => {
                let result = self.register_function(name, kind);
                self.acknowledge(key, result);
            }
            InputMessage::Import { key, database } => {
                let result = self.import(key, database);
                self.acknowledge(key, result);
            }
            InputMessage::Export { key, target } => {
                let result = self.export(&target);
                self.acknowledge(key, result);
            }
            InputMessage::GetInfo { key } => match self.info() {
                Ok(info) => self.emit(OutputMessage::Info { key, info }),
                Err(err) => self.fail(Some(key), &err),
            },
            InputMessage::Delete { key } => {
                let result = self.delete();
                self.acknowledge(key, result);
            }
            InputMessage::Destroy { key } => {
                self.destroy();
                self.emit(OutputMessage::Success { key });
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn must_defer(&self, message: &InputMessage) -> bool {
        let Some(active) = self.active else {
            return false;
        };
        match message {
            InputMessage::Destroy { .. } | InputMessage::Config(_) => false,
            InputMessage::Query {
                transaction_key, ..
            } => *transaction_key != Some(active),
            InputMessage::Transaction {
                transaction_key, ..
            } => *transaction_key != active,
            _ => true,
        }
    }

    fn drain_deferred(&mut self) -> Flow {
        let pending = std::mem::take(&mut self.deferred);
        debug!(count = pending.len(), "replaying deferred requests");
        for message in pending {
            // Requests deferred again by a newly opened session keep their order.
            if self.active.is_some() {
                self.deferred.push_back(message);
                continue;
            }
            if self.handle(message) == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn verbose(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.verbose)
    }

    fn configure(&mut self, config: EngineConfig) {
        if self.config.is_some() {
            warn!("ignoring repeated engine configuration");
            return;
        }
        self.store = (!config.is_memory()).then(|| DirectoryStore::new(&config.storage_root));
        info!(
            database = %config.database_path,
            read_only = config.read_only,
            "engine configured"
        );
        self.config = Some(config);
        self.reinit(ConnectReason::Initial);
    }

    fn reinit(&mut self, reason: ConnectReason) {
        self.close();
        match self.open() {
            Ok(()) => self.emit(OutputMessage::Connect { reason }),
            Err(err) => self.fail(None, &err),
        }
    }

    fn open(&mut self) -> WorkerResult<()> {
        let conn = self.connect()?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Opens and prepares a connection without touching the current one.
    fn connect(&self) -> WorkerResult<Connection> {
        let config = self.config.as_ref().ok_or(WorkerError::NotOpen)?;

        let conn = match &self.store {
            None => Connection::open_in_memory()?,
            Some(store) => {
                store.create_parent_dirs(&config.database_path)?;
                let path = store.resolve(&config.database_path)?;
                let flags = if config.read_only {
                    OpenFlags::SQLITE_OPEN_READ_ONLY
                        | OpenFlags::SQLITE_OPEN_URI
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX
                } else {
                    OpenFlags::default()
                };
                Connection::open_with_flags(path, flags)?
            }
        };
        self.prepare(&conn)?;

        debug!(database = %config.database_path, "database opened");
        Ok(conn)
    }

    /// Applies the busy timeout, `on_init` statements and registered
    /// functions to a fresh connection.
    fn prepare(&self, conn: &Connection) -> WorkerResult<()> {
        let config = self.config.as_ref().ok_or(WorkerError::NotOpen)?;
        conn.busy_timeout(config.busy_timeout)?;
        for statement in &config.on_init {
            run_statement(conn, statement, config.verbose)?;
        }
        for (name, kind) in &self.functions {
            self.install_function(conn, name, *kind)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, err)) = conn.close() {
                warn!(error = %err, "error closing database");
            }
        }
    }

    fn connection(&self) -> WorkerResult<&Connection> {
        self.conn.as_ref().ok_or(WorkerError::NotOpen)
    }

    fn query(
        &self,
        statement: &Statement,
        transaction_key: Option<TransactionKey>,
    ) -> WorkerResult<ResultSet> {
        if let Some(tx) = transaction_key {
            if self.active != Some(tx) {
                return Err(WorkerError::TransactionNotActive(tx));
            }
        }
        let verbose = self.verbose();
        run_statement(self.connection()?, statement, verbose)
    }

    fn batch(&mut self, statements: &[Statement]) -> WorkerResult<Vec<ResultSet>> {
        let verbose = self.verbose();
        let conn = self.conn.as_mut().ok_or(WorkerError::NotOpen)?;
        let tx = conn.transaction()?;
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(run_statement(&tx, statement, verbose)?);
        }
        tx.commit()?;
        Ok(results)
    }

    fn transaction(&mut self, key: TransactionKey, action: TransactionAction) -> WorkerResult<()> {
        let conn = self.conn.as_ref().ok_or(WorkerError::NotOpen)?;
        match action {
            TransactionAction::Begin => {
                if self.active.is_some() {
                    return Err(WorkerError::TransactionActive(key));
                }
                conn.execute_batch("BEGIN")?;
                self.active = Some(key);
                debug!(transaction = %key, "transaction begun");
            }
            TransactionAction::Commit => {
                if self.active != Some(key) {
                    return Err(WorkerError::TransactionNotActive(key));
                }
                if let Err(err) = conn.execute_batch("COMMIT") {
                    // A failed commit that left no open transaction behind
                    // cannot be retried.
                    if conn.is_autocommit() {
                        self.active = None;
                    }
                    return Err(err.into());
                }
                self.active = None;
                debug!(transaction = %key, "transaction committed");
            }
            TransactionAction::Rollback => {
                if self.active != Some(key) {
                    return Err(WorkerError::TransactionNotActive(key));
                }
                if !conn.is_autocommit() {
                    conn.execute_batch("ROLLBACK")?;
                }
                self.active = None;
                debug!(transaction = %key, "transaction rolled back");
            }
        }
        Ok(())
    }

    fn register_function(&mut self, name: String, kind: FunctionKind) -> WorkerResult<()> {
        if let Some(conn) = &self.conn {
            self.install_function(conn, &name, kind)?;
        }
        self.functions.retain(|(existing, _)| *existing != name);
        debug!(function = %name, ?kind, "function registered");
        self.functions.push((name, kind));
        Ok(())
    }

    fn install_function(
        &self,
        conn: &Connection,
        name: &str,
        kind: FunctionKind,
    ) -> WorkerResult<()> {
        let flags = FunctionFlags::SQLITE_UTF8;
        match kind {
            FunctionKind::Callback => {
                let relay = AssertUnwindSafe((name.to_string(), self.output.clone()));
                conn.create_scalar_function(name, -1, flags, move |ctx| {
                    let (name, output) = &*relay;
                    let message = OutputMessage::Callback {
                        name: name.clone(),
                        args: arguments(ctx),
                    };
                    if output.send(message).is_err() {
                        warn!(function = %name, "callback dropped, client is gone");
                    }
                    Ok(rusqlite::types::Value::Null)
                })?;
            }
            FunctionKind::Scalar => {
                let handle = AssertUnwindSafe((name.to_string(), Arc::clone(&self.proxy)));
                conn.create_scalar_function(name, -1, flags, move |ctx| {
                    let (name, proxy) = &*handle;
                    proxy
                        .call_scalar(name, &arguments(ctx))
                        .map(|value| to_sql(&value))
                        .map_err(|message| rusqlite::Error::UserFunctionError(message.into()))
                })?;
            }
        }
        Ok(())
    }

    fn import(&mut self, key: QueryKey, database: Bytes) -> WorkerResult<()> {
        if !database.starts_with(SQLITE_HEADER) {
            return Err(WorkerError::InvalidImage);
        }
        match self.store.clone() {
            Some(store) => {
                let path = self.database_path()?;
                let staging = format!("{path}.import-{key}");
                store.write(&staging, &database)?;
                let replaced = check_image(&store.resolve(&staging)?)
                    .and_then(|()| self.swap_file(&store, &path, Some(&staging)));
                if let Err(err) = store.remove(&staging) {
                    warn!(error = %err, "failed to remove import staging file");
                }
                replaced?;
            }
            None => {
                // In-memory databases are loaded through a staging file and
                // the online backup API.
                let staging = DirectoryStore::new(std::env::temp_dir());
                let name = format!("sqlworker-import-{key}.sqlite3");
                staging.write(&name, &database)?;
                let loaded = self.load_memory_image(&staging.resolve(&name)?);
                if let Err(err) = staging.remove(&name) {
                    warn!(error = %err, "failed to remove import staging file");
                }
                loaded?;
            }
        }

        info!(bytes = database.len(), "database imported");
        self.emit(OutputMessage::Connect {
            reason: ConnectReason::Overwrite,
        });
        Ok(())
    }

    /// Copies the image at `path` into a new in-memory connection and
    /// swaps it in once it is fully loaded and prepared.
    fn load_memory_image(&mut self, path: &Path) -> WorkerResult<()> {
        let source = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let mut fresh = Connection::open_in_memory()?;
        Backup::new(&source, &mut fresh)?.run_to_completion(128, Duration::ZERO, None)?;
        self.prepare(&fresh)?;

        self.close();
        self.conn = Some(fresh);
        Ok(())
    }

    fn delete(&mut self) -> WorkerResult<()> {
        match self.store.clone() {
            Some(store) => {
                let path = self.database_path()?;
                self.swap_file(&store, &path, None)?;
            }
            None => {
                let fresh = self.connect()?;
                self.close();
                self.conn = Some(fresh);
            }
        }

        info!("database deleted");
        self.emit(OutputMessage::Connect {
            reason: ConnectReason::Delete,
        });
        Ok(())
    }

    /// Replaces the database file with `replacement` (or with nothing) and
    /// reopens it.
    ///
    /// The previous file is set aside until the reopen succeeds. On failure
    /// it is put back and reopened; if even that fails the engine reports a
    /// fault.
    fn swap_file(
        &mut self,
        store: &DirectoryStore,
        path: &str,
        replacement: Option<&str>,
    ) -> WorkerResult<()> {
        let previous = format!("{path}.previous");
        store.remove(&previous)?;
        self.close();

        let mut stage = SwapStage::Untouched;
        let swapped = self.install_file(store, path, &previous, replacement, &mut stage);
        match swapped {
            Ok(()) => {
                if let Err(err) = store.remove(&previous) {
                    warn!(error = %err, "failed to remove previous database file");
                }
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "database file swap failed, restoring previous file");
                if let Err(restore) = self.restore_file(store, path, &previous, stage) {
                    self.fail(None, &restore);
                }
                Err(err)
            }
        }
    }

    fn install_file(
        &mut self,
        store: &DirectoryStore,
        path: &str,
        previous: &str,
        replacement: Option<&str>,
        stage: &mut SwapStage,
    ) -> WorkerResult<()> {
        remove_sidecars(store, path)?;
        *stage = if store.rename(path, previous)? {
            SwapStage::SetAside
        } else {
            SwapStage::NoPrevious
        };
        if let Some(staging) = replacement {
            store.rename(staging, path)?;
        }
        self.open()
    }

    fn restore_file(
        &mut self,
        store: &DirectoryStore,
        path: &str,
        previous: &str,
        stage: SwapStage,
    ) -> WorkerResult<()> {
        self.close();
        match stage {
            SwapStage::Untouched => {}
            SwapStage::NoPrevious => {
                remove_sidecars(store, path)?;
                store.remove(path)?;
            }
            SwapStage::SetAside => {
                remove_sidecars(store, path)?;
                store.rename(previous, path)?;
            }
        }
        self.open()
    }

    fn export(&self, target: &Path) -> WorkerResult<()> {
        let conn = self.connection()?;
        match &self.store {
            Some(store) if !journal_is_wal(conn)? => {
                let source = store.resolve(&self.database_path()?)?;
                // A read transaction keeps other connections from committing
                // while the file is copied.
                conn.execute_batch("BEGIN")?;
                let copied = conn
                    .query_row("SELECT count(*) FROM sqlite_master", [], |_| Ok(()))
                    .map_err(WorkerError::from)
                    .and_then(|()| {
                        fs::copy(&source, target)
                            .map(|_| ())
                            .map_err(|err| WorkerError::Store(StoreError::Io(err)))
                    });
                let finished = conn.execute_batch("COMMIT");
                copied?;
                finished?;
            }
            _ => {
                conn.execute("VACUUM INTO ?1", [target.to_string_lossy().into_owned()])?;
            }
        }
        debug!(target = %target.display(), "database exported");
        Ok(())
    }

    fn info(&self) -> WorkerResult<DatabaseInfo> {
        let conn = self.connection()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        let size = u64::try_from(page_count.saturating_mul(page_size)).ok();

        let persisted = self.store.is_some();
        Ok(DatabaseInfo {
            database_path: if persisted {
                Some(self.database_path()?)
            } else {
                None
            },
            database_size_bytes: size,
            storage_type: if persisted {
                StorageType::Directory
            } else {
                StorageType::Memory
            },
            persisted,
        })
    }

    fn destroy(&mut self) {
        if let (Some(tx), Some(conn)) = (self.active.take(), &self.conn) {
            if !conn.is_autocommit() {
                if let Err(err) = conn.execute_batch("ROLLBACK") {
                    warn!(transaction = %tx, error = %err, "rollback on destroy failed");
                }
            }
        }
        if !self.deferred.is_empty() {
            debug!(count = self.deferred.len(), "dropping deferred requests");
            self.deferred.clear();
        }
        self.close();
        info!("engine destroyed");
    }

    fn database_path(&self) -> WorkerResult<String> {
        self.config
            .as_ref()
            .map(|c| c.database_path.clone())
            .ok_or(WorkerError::NotOpen)
    }

    fn reply(&self, key: QueryKey, result: WorkerResult<Vec<ResultSet>>) {
        match result {
            Ok(results) => self.emit(OutputMessage::Data { key, results }),
            Err(err) => self.fail(Some(key), &err),
        }
    }

    fn acknowledge(&self, key: QueryKey, result: WorkerResult<()>) {
        match result {
            Ok(()) => self.emit(OutputMessage::Success { key }),
            Err(err) => self.fail(Some(key), &err),
        }
    }

    fn fail(&self, key: Option<QueryKey>, err: &WorkerError) {
        if key.is_none() {
            warn!(error = %err, "engine failure without request");
        } else {
            debug!(error = %err, "request failed");
        }
        self.emit(OutputMessage::Error {
            key,
            error: err.to_payload(),
        });
    }

    fn emit(&self, message: OutputMessage) {
        if self.output.send(message).is_err() {
            debug!("client gone, dropping engine output");
        }
    }
}

fn arguments(ctx: &Context<'_>) -> Vec<Value> {
    (0..ctx.len()).map(|idx| from_sql(ctx.get_raw(idx))).collect()
}

/// Fails unless the file at `path` opens as a SQLite database.
fn check_image(path: &Path) -> WorkerResult<()> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    conn.query_row("PRAGMA schema_version", [], |_| Ok(()))?;
    Ok(())
}

fn journal_is_wal(conn: &Connection) -> WorkerResult<bool> {
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    Ok(mode.eq_ignore_ascii_case("wal"))
}

fn remove_sidecars(store: &DirectoryStore, path: &str) -> WorkerResult<()> {
    for suffix in SIDECAR_SUFFIXES {
        store.remove(&format!("{path}{suffix}"))?;
    }
    Ok(())
}
