//! Cross-client reinitialization channel.
//!
//! When one client replaces or deletes a database file, every other client
//! of the same database in this process must reopen it. Notices travel over
//! a process-wide broadcast topic named after the database.

use parking_lot::Mutex;
use sqlworker_protocol::{ClientKey, ConnectReason};
use std::collections::HashMap;
use std::sync::LazyLock;
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 16;

/// Process-wide topics by database name, created on first use.
static TOPICS: LazyLock<Mutex<HashMap<String, broadcast::Sender<ReinitNotice>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Notice that a database file changed underneath its readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReinitNotice {
    /// Client that changed the file.
    pub client_key: ClientKey,
    /// What it did.
    pub reason: ConnectReason,
}

fn topic(name: &str) -> broadcast::Sender<ReinitNotice> {
    TOPICS
        .lock()
        .entry(name.to_string())
        .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
        .clone()
}

/// Subscribes to notices for `name`.
pub(crate) fn subscribe(name: &str) -> broadcast::Receiver<ReinitNotice> {
    topic(name).subscribe()
}

/// Publishes a notice to every subscriber of `name`; returns how many received it.
pub(crate) fn publish(name: &str, notice: ReinitNotice) -> usize {
    // No subscribers is not an error.
    topic(name).send(notice).unwrap_or(0)
}
