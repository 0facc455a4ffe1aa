//! Test fixtures and client helpers.
//!
//! Provides temporary stores and clients that report their connect events.

use sqlworker_client::{Client, ClientConfig, ConnectReason};
use sqlworker_storage::DirectoryStore;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// How long fixtures wait for engine events before failing the test.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// A temporary store root, removed on drop.
pub struct TempStore {
    dir: TempDir,
}

impl TempStore {
    /// Creates an empty store root.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the store root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns a file store rooted here.
    pub fn store(&self) -> DirectoryStore {
        DirectoryStore::new(self.dir.path())
    }

    /// Returns a client configuration for `database` in this store.
    pub fn config(&self, database: &str) -> ClientConfig {
        ClientConfig::new(database).with_storage_root(self.dir.path())
    }

    /// Connects a client to `database` in this store.
    pub async fn client(&self, database: &str) -> TestClient {
        TestClient::open(self.config(database)).await
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected client that records the reasons of its connect events.
///
/// Dereferences to [`Client`].
pub struct TestClient {
    /// The client.
    pub client: Client,
    connects: mpsc::UnboundedReceiver<ConnectReason>,
}

impl TestClient {
    /// Connects a client to a private in-memory database.
    pub async fn memory() -> Self {
        Self::open(ClientConfig::memory()).await
    }

    /// Connects a client and waits for the initial connect event.
    ///
    /// Any `on_connect` hook already in `config` keeps being called.
    pub async fn open(mut config: ClientConfig) -> Self {
        let (tx, connects) = mpsc::unbounded_channel();
        let previous = config.on_connect.take();
        let config = config.with_on_connect(move |reason| {
            if let Some(hook) = &previous {
                hook(reason);
            }
            let _ = tx.send(reason);
        });

        let mut fixture = Self {
            client: Client::connect(config),
            connects,
        };
        fixture.wait_for_connect(ConnectReason::Initial).await;
        fixture
    }

    /// Waits for the next connect event and checks its reason.
    pub async fn wait_for_connect(&mut self, expected: ConnectReason) {
        let reason = tokio::time::timeout(EVENT_TIMEOUT, self.connects.recv())
            .await
            .expect("Timed out waiting for connect event")
            .expect("Client dropped its connect hook");
        assert_eq!(reason, expected, "unexpected connect reason");
    }

    /// Returns the next connect event if one already arrived.
    pub fn try_connect_event(&mut self) -> Option<ConnectReason> {
        self.connects.try_recv().ok()
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
