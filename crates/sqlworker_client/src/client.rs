//! Client facade.

use crate::broadcast::{self, ReinitNotice};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::functions::{FunctionRegistry, Handle};
use crate::lock::{LockMode, MutationLock};
use crate::registry::{Registry, Reply};
use crate::transaction::{Transaction, TransactionScope, TransactionState};
use bytes::Bytes;
use parking_lot::Mutex;
use sqlworker_engine::Engine;
use sqlworker_protocol::{
    ClientKey, ConnectReason, DatabaseInfo, EngineChannel, FunctionProxy, InputMessage,
    OutputMessage, QueryKey, RequestSender, ResponseReceiver, ResultSet, Statement,
    TransactionAction, TransactionKey, Value,
};
use sqlworker_storage::{DirectoryStore, FileStore, StoreError};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// File name reported for exports of in-memory databases.
const MEMORY_EXPORT_NAME: &str = "memory.sqlite3";

/// A database file exported from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseFile {
    /// File name of the database.
    pub name: String,
    /// Complete SQLite database image.
    pub bytes: Bytes,
}

/// Async handle to a SQL engine running on a background worker.
///
/// Cheap to clone; clones share one engine. The client is torn down by
/// [`Client::destroy`] or when the last clone is dropped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    key: ClientKey,
    config: ClientConfig,
    shared_name: Option<String>,
    attached: bool,
    requests: Mutex<Option<RequestSender>>,
    destroyed: AtomicBool,
    fault: Mutex<Option<String>>,
    registry: Registry,
    lock: MutationLock,
    functions: Arc<FunctionRegistry>,
    store: Option<DirectoryStore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Client {
    /// Starts an engine thread and attaches a new client to it.
    ///
    /// Must be called from within a tokio runtime. If the engine thread
    /// cannot be started the client is returned detached and every call
    /// fails with [`ClientError::NotConnected`].
    pub fn connect(config: ClientConfig) -> Self {
        let functions = Arc::new(FunctionRegistry::default());
        let (channel, endpoint) = sqlworker_protocol::channel();
        let proxy: Arc<dyn FunctionProxy> = functions.clone();

        match Engine::spawn(endpoint, proxy) {
            // The engine thread runs detached; `destroy` stops it.
            Ok(_engine) => Self::attach(config, channel, functions),
            Err(err) => {
                warn!(error = %err, "engine failed to start, client is detached");
                Self::detached(config)
            }
        }
    }

    /// Attaches a new client to an engine reached through `channel`.
    ///
    /// Scalar functions registered on the client are only callable if the
    /// engine was given [`Client::function_proxy`].
    pub fn with_engine(config: ClientConfig, channel: EngineChannel) -> Self {
        Self::attach(config, channel, Arc::new(FunctionRegistry::default()))
    }

    /// Creates a client that never attached to an engine.
    pub fn detached(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner::new(config, None, Arc::default())),
        }
    }

    fn attach(
        config: ClientConfig,
        channel: EngineChannel,
        functions: Arc<FunctionRegistry>,
    ) -> Self {
        let (requests, responses) = channel.into_parts();
        let handshake = config.engine_config();
        let client = Self {
            inner: Arc::new(ClientInner::new(config, Some(requests), functions)),
        };
        let inner = &client.inner;

        if let Err(err) = inner.send(InputMessage::Config(handshake)) {
            warn!(client = %inner.key, error = %err, "engine handshake not delivered");
        }

        let mut tasks = vec![tokio::spawn(dispatch(Arc::downgrade(inner), responses))];
        if let Some(name) = &inner.shared_name {
            let notices = broadcast::subscribe(name);
            tasks.push(tokio::spawn(listen(Arc::downgrade(inner), inner.key, notices)));
        }
        *inner.tasks.lock() = tasks;

        info!(
            client = %inner.key,
            database = %inner.config.database_path,
            "client attached"
        );
        client
    }

    /// Returns this client's key.
    pub fn key(&self) -> ClientKey {
        self.inner.key
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns true once [`Client::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Returns the number of requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.registry.len()
    }

    /// Returns the proxy an engine uses to call this client's scalar functions.
    pub fn function_proxy(&self) -> Arc<dyn FunctionProxy> {
        self.inner.functions.clone()
    }

    /// Runs `sql` with positional `params` and returns its result set.
    ///
    /// When `sql` holds several statements the last one's result is returned.
    pub async fn query(
        &self,
        sql: &str,
        params: impl IntoIterator<Item = Value>,
    ) -> ClientResult<ResultSet> {
        self.execute(Statement::new(sql).with_params(params.into_iter().collect()))
            .await
    }

    /// Runs one statement and returns its result set.
    pub async fn execute(&self, statement: Statement) -> ClientResult<ResultSet> {
        let reply = self
            .round_trip(LockMode::Shared, false, |key| InputMessage::Query {
                key,
                statement,
                transaction_key: None,
            })
            .await?;
        first_result(reply)
    }

    /// Runs `statements` atomically and returns one result set per statement,
    /// in input order.
    pub async fn batch(&self, statements: Vec<Statement>) -> ClientResult<Vec<ResultSet>> {
        let expected = statements.len();
        let reply = self
            .round_trip(LockMode::Shared, false, |key| InputMessage::Batch {
                key,
                statements,
            })
            .await?;

        let mut results = match reply {
            Reply::Data(results) => results,
            Reply::Success => Vec::new(),
            Reply::Info(_) => return Err(ClientError::UnexpectedReply("info")),
        };
        results.resize_with(expected, ResultSet::default);
        Ok(results)
    }

    /// Begins a transaction session.
    ///
    /// Waits for exclusive access, which the session keeps until it
    /// commits, rolls back, or is dropped.
    pub async fn begin_transaction(&self) -> ClientResult<Transaction> {
        self.inner.ensure_usable()?;
        let ticket = self.inner.lock.acquire(LockMode::Exclusive, false).await;
        let transaction_key = TransactionKey::new();

        self.round_trip(LockMode::Exclusive, true, |key| InputMessage::Transaction {
            key,
            transaction_key,
            action: TransactionAction::Begin,
        })
        .await?;

        debug!(client = %self.inner.key, transaction = %transaction_key, "transaction begun");
        Ok(Transaction::new(self.clone(), transaction_key, ticket))
    }

    /// Runs `body` inside a transaction session.
    ///
    /// Commits if `body` succeeds. If `body` or the commit fails, the
    /// session is rolled back and the original error returned; a failing
    /// rollback is logged.
    pub async fn transaction<F, Fut, T>(&self, body: F) -> ClientResult<T>
    where
        F: FnOnce(TransactionScope) -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let mut transaction = self.begin_transaction().await?;

        let outcome = match body(transaction.scope()).await {
            Ok(value) => transaction.commit().await.map(|()| value),
            Err(err) => Err(err),
        };

        if let Err(cause) = &outcome {
            if transaction.state() == TransactionState::Begun {
                if let Err(err) = transaction.rollback().await {
                    error!(
                        transaction = %transaction.key(),
                        error = %err,
                        cause = %cause,
                        "rollback after failed transaction also failed"
                    );
                }
            }
        }
        outcome
    }

    /// Registers a fire-and-forget SQL function.
    ///
    /// The engine relays each call's arguments to `f`; the SQL call itself
    /// evaluates to `NULL`.
    pub async fn create_callback_function<F>(&self, name: &str, f: F) -> ClientResult<()>
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.register_function(name, Handle::Callback(Arc::new(f)))
            .await
    }

    /// Registers a SQL function whose return value is used by the statement.
    ///
    /// `f` runs synchronously on the engine thread; an `Err` fails the
    /// statement with that message.
    pub async fn create_scalar_function<F>(&self, name: &str, f: F) -> ClientResult<()>
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register_function(name, Handle::Scalar(Arc::new(f)))
            .await
    }

    async fn register_function(&self, name: &str, handle: Handle) -> ClientResult<()> {
        self.inner.ensure_usable()?;
        let kind = handle.kind();
        self.inner.functions.insert(name, handle)?;

        let function = name.to_string();
        let result = self
            .round_trip(LockMode::Shared, false, |key| InputMessage::Function {
                key,
                name: function,
                kind,
            })
            .await;
        if result.is_err() {
            self.inner.functions.remove(name);
        }
        result.map(|_| ())
    }

    /// Exports the whole database file.
    ///
    /// The engine copies the database into a temporary file in the store,
    /// which is read and removed before returning.
    pub async fn get_database_file(&self) -> ClientResult<DatabaseFile> {
        self.inner.ensure_usable()?;
        let store = self.inner.export_store();
        let temp_name = format!(".export-{}.sqlite3", Uuid::new_v4());
        let target = store.resolve(&temp_name)?;

        let exported = self
            .round_trip(LockMode::Shared, false, |key| InputMessage::Export {
                key,
                target,
            })
            .await;

        let data = tokio::task::spawn_blocking(move || {
            let data = exported.map(|_| store.read(&temp_name));
            if let Err(err) = store.remove(&temp_name) {
                warn!(file = %temp_name, error = %err, "failed to remove export file");
            }
            data
        })
        .await
        .map_err(|err| StoreError::Io(std::io::Error::other(err)))???;

        debug!(client = %self.inner.key, bytes = data.len(), "database exported");
        Ok(DatabaseFile {
            name: self.inner.file_name(),
            bytes: Bytes::from(data),
        })
    }

    /// Replaces the database file with `bytes`.
    pub async fn overwrite_database_file(&self, bytes: impl Into<Bytes>) -> ClientResult<()> {
        self.overwrite_database_file_with(bytes, no_hook).await
    }

    /// Replaces the database file with `bytes`, running `before_unlock`
    /// after sibling clients were notified and before the lock is released.
    ///
    /// # Errors
    ///
    /// A failing hook is reported as [`ClientError::Hook`] after the lock
    /// is released; the new file stays in place.
    pub async fn overwrite_database_file_with<F, Fut, E>(
        &self,
        bytes: impl Into<Bytes>,
        before_unlock: F,
    ) -> ClientResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let database = bytes.into();
        self.replace_file(
            ConnectReason::Overwrite,
            |key| InputMessage::Import { key, database },
            before_unlock,
        )
        .await
    }

    /// Deletes the database file; the engine reopens an empty database.
    pub async fn delete_database_file(&self) -> ClientResult<()> {
        self.delete_database_file_with(no_hook).await
    }

    /// Deletes the database file, running `before_unlock` after sibling
    /// clients were notified and before the lock is released.
    pub async fn delete_database_file_with<F, Fut, E>(&self, before_unlock: F) -> ClientResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        self.replace_file(
            ConnectReason::Delete,
            |key| InputMessage::Delete { key },
            before_unlock,
        )
        .await
    }

    async fn replace_file<B, F, Fut, E>(
        &self,
        reason: ConnectReason,
        build: B,
        before_unlock: F,
    ) -> ClientResult<()>
    where
        B: FnOnce(QueryKey) -> InputMessage,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        self.inner.ensure_usable()?;
        let ticket = self.inner.lock.acquire(LockMode::Exclusive, false).await;

        self.round_trip(LockMode::Exclusive, true, build).await?;
        self.inner.notify_siblings(reason);

        let hook = before_unlock()
            .await
            .map_err(|err| ClientError::Hook(err.to_string()));
        drop(ticket);

        if let Err(err) = &hook {
            warn!(client = %self.inner.key, error = %err, "before-unlock hook failed");
        }
        hook
    }

    /// Reports database facts.
    pub async fn get_database_info(&self) -> ClientResult<DatabaseInfo> {
        let reply = self
            .round_trip(LockMode::Shared, false, |key| InputMessage::GetInfo { key })
            .await?;
        match reply {
            Reply::Info(info) => Ok(info),
            Reply::Success => Err(ClientError::UnexpectedReply("success")),
            Reply::Data(_) => Err(ClientError::UnexpectedReply("data")),
        }
    }

    /// Tears the client down.
    ///
    /// Pending calls never settle, later calls fail with
    /// [`ClientError::Destroyed`], and the engine is told to close. Calling
    /// it again does nothing.
    pub fn destroy(&self) {
        self.inner.shutdown();
    }

    /// Sends one request and waits for its reply.
    ///
    /// Admission happens before the key is registered, so a call waiting on
    /// the lock has nothing in flight.
    pub(crate) async fn round_trip<F>(
        &self,
        mode: LockMode,
        bypass: bool,
        build: F,
    ) -> ClientResult<Reply>
    where
        F: FnOnce(QueryKey) -> InputMessage,
    {
        let inner = &self.inner;
        inner.ensure_usable()?;
        let _ticket = inner.lock.acquire(mode, bypass).await;
        inner.ensure_usable()?;

        let key = QueryKey::new();
        let message = build(key);
        debug!(client = %inner.key, kind = message.kind(), %key, "sending request");

        let receiver = inner.registry.register(key);
        if let Err(err) = inner.send(message) {
            inner.registry.remove(key);
            return Err(err);
        }

        match receiver.await {
            Ok(result) => result,
            // Cleared by destroy: the call is abandoned.
            Err(_) => std::future::pending().await,
        }
    }

    /// Sends one request without waiting for its reply.
    pub(crate) fn send_detached<F>(&self, build: F) -> ClientResult<()>
    where
        F: FnOnce(QueryKey) -> InputMessage,
    {
        let key = QueryKey::new();
        // The receiver is dropped so the reply is consumed quietly.
        drop(self.inner.registry.register(key));
        self.inner.send(build(key)).inspect_err(|_| {
            self.inner.registry.remove(key);
        })
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("key", &self.inner.key)
            .field("database", &self.inner.config.database_path)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Unwraps the first result set of a query reply.
pub(crate) fn first_result(reply: Reply) -> ClientResult<ResultSet> {
    match reply {
        Reply::Data(results) => Ok(results.into_iter().next().unwrap_or_default()),
        Reply::Success => Ok(ResultSet::empty()),
        Reply::Info(_) => Err(ClientError::UnexpectedReply("info")),
    }
}

fn no_hook() -> std::future::Ready<Result<(), Infallible>> {
    std::future::ready(Ok(()))
}

impl ClientInner {
    fn new(
        config: ClientConfig,
        requests: Option<RequestSender>,
        functions: Arc<FunctionRegistry>,
    ) -> Self {
        let shared_name = config.shared_name();
        let store = (!config.is_memory()).then(|| DirectoryStore::new(&config.storage_root));
        Self {
            key: ClientKey::new(),
            lock: MutationLock::for_scope(config.lock_scope, shared_name.as_deref()),
            shared_name,
            attached: requests.is_some(),
            requests: Mutex::new(requests),
            destroyed: AtomicBool::new(false),
            fault: Mutex::new(None),
            registry: Registry::default(),
            functions,
            store,
            tasks: Mutex::new(Vec::new()),
            config,
        }
    }

    fn ensure_usable(&self) -> ClientResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(ClientError::Destroyed);
        }
        if !self.attached {
            return Err(ClientError::NotConnected);
        }
        if let Some(fault) = self.fault.lock().as_ref() {
            return Err(ClientError::Fault(fault.clone()));
        }
        Ok(())
    }

    fn send(&self, message: InputMessage) -> ClientResult<()> {
        let requests = self.requests.lock();
        let Some(sender) = requests.as_ref() else {
            // Taken by shutdown, or never attached.
            return Err(if self.destroyed.load(Ordering::SeqCst) {
                ClientError::Destroyed
            } else {
                ClientError::NotConnected
            });
        };
        sender
            .send(message)
            .map_err(|_| ClientError::ChannelClosed)
    }

    fn route(&self, message: OutputMessage) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        match message {
            OutputMessage::Success { key } => self.settle(key, Reply::Success),
            OutputMessage::Data { key, results } => self.settle(key, Reply::Data(results)),
            OutputMessage::Info { key, info } => self.settle(key, Reply::Info(info)),
            OutputMessage::Error {
                key: Some(key),
                error,
            } => {
                let message = error.message.clone();
                if !self.registry.reject(key, ClientError::Engine(error)) {
                    self.record_fault(format!("error for unknown request {key}: {message}"));
                }
            }
            OutputMessage::Error { key: None, error } => self.record_fault(error.message),
            OutputMessage::Callback { name, args } => {
                if !self.functions.invoke_callback(&name, args) {
                    debug!(function = %name, "ignoring callback for unregistered function");
                }
            }
            OutputMessage::Connect { reason } => {
                info!(client = %self.key, %reason, "database connected");
                if let Some(hook) = &self.config.on_connect {
                    hook(reason);
                }
            }
        }
    }

    fn settle(&self, key: QueryKey, reply: Reply) {
        if !self.registry.resolve(key, reply) {
            debug!(%key, "reply for unknown request ignored");
        }
    }

    fn record_fault(&self, message: String) {
        error!(client = %self.key, fault = %message, "unrecoverable engine fault");
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(message);
        }
    }

    fn notify_siblings(&self, reason: ConnectReason) {
        let Some(name) = &self.shared_name else {
            return;
        };
        let receivers = broadcast::publish(
            name,
            ReinitNotice {
                client_key: self.key,
                reason,
            },
        );
        debug!(client = %self.key, %reason, receivers, "reinit notice published");
    }

    fn export_store(&self) -> DirectoryStore {
        self.store
            .clone()
            .unwrap_or_else(|| DirectoryStore::new(std::env::temp_dir()))
    }

    fn file_name(&self) -> String {
        if self.config.is_memory() {
            return MEMORY_EXPORT_NAME.to_string();
        }
        Path::new(&self.config.database_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.config.database_path.clone())
    }

    fn shutdown(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let abandoned = self.registry.clear_all();

        if let Some(requests) = self.requests.lock().take() {
            let destroy = InputMessage::Destroy {
                key: QueryKey::new(),
            };
            if requests.send(destroy).is_err() {
                debug!(client = %self.key, "engine already gone");
            }
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!(client = %self.key, abandoned, "client destroyed");
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Routes engine output until the engine goes away.
async fn dispatch(client: Weak<ClientInner>, mut responses: ResponseReceiver) {
    while let Some(message) = responses.recv().await {
        let Some(inner) = client.upgrade() else {
            return;
        };
        inner.route(message);
    }

    if let Some(inner) = client.upgrade() {
        if !inner.destroyed.load(Ordering::SeqCst) {
            let failed = inner.registry.fail_all(|| ClientError::ChannelClosed);
            warn!(client = %inner.key, failed, "engine channel closed");
        }
    }
}

/// Forwards sibling reinit notices to this client's engine.
async fn listen(client: Weak<ClientInner>, own_key: ClientKey, mut notices: Receiver<ReinitNotice>) {
    loop {
        let reason = match notices.recv().await {
            Ok(notice) if notice.client_key == own_key => continue,
            Ok(notice) => notice.reason,
            Err(RecvError::Lagged(skipped)) => {
                warn!(client = %own_key, skipped, "missed reinit notices, reopening");
                ConnectReason::Overwrite
            }
            Err(RecvError::Closed) => return,
        };

        let Some(inner) = client.upgrade() else {
            return;
        };
        if inner.destroyed.load(Ordering::SeqCst) {
            return;
        }
        debug!(client = %own_key, %reason, "sibling changed the database, reopening");
        if inner.send(InputMessage::Reinit { reason }).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlworker_protocol::{channel, EngineEndpoint, EngineError};
    use std::time::Duration;
    use tokio::time::timeout;

    fn attached() -> (Client, EngineEndpoint) {
        let (client_half, endpoint) = channel();
        let client = Client::with_engine(ClientConfig::memory(), client_half);
        (client, endpoint)
    }

    async fn expect_config(endpoint: &mut EngineEndpoint) {
        match endpoint.recv().await {
            Some(InputMessage::Config(config)) => assert!(config.database_path.contains("memory")),
            other => panic!("expected handshake, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn detached_client_fails_fast() {
        let client = Client::detached(ClientConfig::memory());
        let err = client.query("SELECT 1", []).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        assert!(matches!(
            client.begin_transaction().await.unwrap_err(),
            ClientError::NotConnected
        ));
    }

    #[tokio::test]
    async fn handshake_is_sent_first() {
        let (client, mut endpoint) = attached();
        let query = tokio::spawn({
            let client = client.clone();
            async move { client.query("SELECT 1", []).await }
        });

        expect_config(&mut endpoint).await;
        let key = match endpoint.recv().await {
            Some(InputMessage::Query { key, statement, .. }) => {
                assert_eq!(statement.sql, "SELECT 1");
                key
            }
            other => panic!("unexpected {other:?}"),
        };
        endpoint
            .send(OutputMessage::Data {
                key,
                results: vec![],
            })
            .unwrap();

        // No result set from the engine becomes an empty one.
        assert!(query.await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn engine_errors_reach_the_caller_unchanged() {
        let (client, mut endpoint) = attached();
        let query = tokio::spawn({
            let client = client.clone();
            async move { client.query("SELECT nope", []).await }
        });

        expect_config(&mut endpoint).await;
        let Some(InputMessage::Query { key, .. }) = endpoint.recv().await else {
            panic!("expected query");
        };
        let payload = EngineError::with_code("no such column: nope", 1);
        endpoint
            .send(OutputMessage::Error {
                key: Some(key),
                error: payload.clone(),
            })
            .unwrap();

        match query.await.unwrap() {
            Err(ClientError::Engine(err)) => assert_eq!(err, payload),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsolicited_error_faults_the_client() {
        let (client, mut endpoint) = attached();
        expect_config(&mut endpoint).await;
        endpoint
            .send(OutputMessage::Error {
                key: None,
                error: EngineError::new("unable to open database file"),
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = timeout(Duration::from_secs(5), client.query("SELECT 1", []))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ClientError::Fault(msg) if msg.contains("unable to open")));
    }

    #[tokio::test]
    async fn error_for_unknown_key_faults_the_client() {
        let (client, mut endpoint) = attached();
        expect_config(&mut endpoint).await;
        endpoint
            .send(OutputMessage::Error {
                key: Some(QueryKey::new()),
                error: EngineError::new("stray"),
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            client.get_database_info().await.unwrap_err(),
            ClientError::Fault(_)
        ));
    }

    #[tokio::test]
    async fn success_for_unknown_key_is_ignored() {
        let (client, mut endpoint) = attached();
        expect_config(&mut endpoint).await;
        endpoint
            .send(OutputMessage::Success {
                key: QueryKey::new(),
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let info = tokio::spawn({
            let client = client.clone();
            async move { client.get_database_info().await }
        });
        let Some(InputMessage::GetInfo { key }) = endpoint.recv().await else {
            panic!("expected getinfo");
        };
        endpoint
            .send(OutputMessage::Info {
                key,
                info: DatabaseInfo {
                    database_path: None,
                    database_size_bytes: Some(4096),
                    storage_type: sqlworker_protocol::StorageType::Memory,
                    persisted: false,
                },
            })
            .unwrap();
        assert_eq!(info.await.unwrap().unwrap().database_size_bytes, Some(4096));
    }

    #[tokio::test]
    async fn closed_engine_rejects_pending_calls() {
        let (client, mut endpoint) = attached();
        let query = tokio::spawn({
            let client = client.clone();
            async move { client.query("SELECT 1", []).await }
        });
        expect_config(&mut endpoint).await;
        let _ = endpoint.recv().await;
        drop(endpoint);

        assert!(matches!(
            query.await.unwrap().unwrap_err(),
            ClientError::ChannelClosed
        ));
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_sends_destroy() {
        let (client, mut endpoint) = attached();
        expect_config(&mut endpoint).await;

        client.destroy();
        client.destroy();
        assert!(client.is_destroyed());
        assert!(matches!(
            endpoint.recv().await,
            Some(InputMessage::Destroy { .. })
        ));
        // Sender dropped after the single destroy.
        assert!(endpoint.recv().await.is_none());
        assert!(matches!(
            client.query("SELECT 1", []).await.unwrap_err(),
            ClientError::Destroyed
        ));
    }

    #[tokio::test]
    async fn send_racing_destroy_reports_destroyed() {
        let (client, _endpoint) = attached();
        // Passed the usability check, then lost the race with destroy.
        client.inner.ensure_usable().unwrap();
        client.destroy();

        let err = client
            .inner
            .send(InputMessage::GetInfo {
                key: QueryKey::new(),
            })
            .unwrap_err();
        assert!(matches!(err, ClientError::Destroyed));

        let detached = Client::detached(ClientConfig::memory());
        let err = detached
            .inner
            .send(InputMessage::GetInfo {
                key: QueryKey::new(),
            })
            .unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn batch_pads_missing_results() {
        let (client, mut endpoint) = attached();
        let batch = tokio::spawn({
            let client = client.clone();
            async move {
                client
                    .batch(vec![
                        Statement::new("SELECT 1"),
                        Statement::new("SELECT 2"),
                        Statement::new("SELECT 3"),
                    ])
                    .await
            }
        });

        expect_config(&mut endpoint).await;
        let Some(InputMessage::Batch { key, statements }) = endpoint.recv().await else {
            panic!("expected batch");
        };
        assert_eq!(statements.len(), 3);
        let one = ResultSet {
            columns: vec!["1".into()],
            rows: vec![vec![Value::Integer(1)]],
        };
        endpoint
            .send(OutputMessage::Data {
                key,
                results: vec![one.clone()],
            })
            .unwrap();

        let results = batch.await.unwrap().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], one);
        assert!(results[1].is_empty() && results[2].is_empty());
    }

    #[test]
    fn first_result_defaults_to_empty() {
        assert!(first_result(Reply::Success).unwrap().is_empty());
        assert!(first_result(Reply::Data(vec![])).unwrap().is_empty());
        assert!(matches!(
            first_result(Reply::Info(DatabaseInfo {
                database_path: None,
                database_size_bytes: None,
                storage_type: sqlworker_protocol::StorageType::Memory,
                persisted: false,
            })),
            Err(ClientError::UnexpectedReply("info"))
        ));
    }
}
