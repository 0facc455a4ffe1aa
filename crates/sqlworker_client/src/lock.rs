//! Shared/exclusive admission control for engine requests.
//!
//! Ordinary statements take the lock in shared mode and run concurrently;
//! transactions, imports and deletes take it exclusively. Waiters are
//! admitted in FIFO order. Release happens when the [`LockTicket`] drops.

use crate::config::LockScope;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::trace;

/// Process-wide locks by database name. Entries are created on first use
/// and live for the rest of the process.
static PROCESS_LOCKS: LazyLock<Mutex<HashMap<String, Arc<RwLock<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Admission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Runs alongside other shared holders.
    Shared,
    /// Runs alone.
    Exclusive,
}

/// An active admission. Dropping it releases the lock.
#[derive(Debug)]
pub struct LockTicket {
    guard: Guard,
}

#[derive(Debug)]
enum Guard {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

impl LockTicket {
    /// Returns the mode this ticket was admitted with.
    pub fn mode(&self) -> LockMode {
        match &self.guard {
            Guard::Shared(_) => LockMode::Shared,
            Guard::Exclusive(_) => LockMode::Exclusive,
        }
    }
}

/// Mutation lock guarding one database.
#[derive(Debug, Clone, Default)]
pub struct MutationLock {
    inner: Arc<RwLock<()>>,
}

impl MutationLock {
    /// Creates a lock owned by the caller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `name` in `scope`.
    ///
    /// Unnamed databases always get a private lock.
    pub fn for_scope(scope: LockScope, name: Option<&str>) -> Self {
        match (scope, name) {
            (LockScope::Process, Some(name)) => Self::process(name),
            _ => Self::new(),
        }
    }

    /// Returns the process-wide lock registered under `name`.
    pub fn process(name: &str) -> Self {
        let mut locks = PROCESS_LOCKS.lock();
        let inner = locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone();
        Self { inner }
    }

    /// Waits for admission in `mode`.
    ///
    /// With `bypass` no lock is taken and `None` is returned; used by
    /// requests issued under an exclusive hold the caller already owns.
    pub async fn acquire(&self, mode: LockMode, bypass: bool) -> Option<LockTicket> {
        if bypass {
            return None;
        }
        trace!(?mode, "waiting for mutation lock");
        let guard = match mode {
            LockMode::Shared => Guard::Shared(Arc::clone(&self.inner).read_owned().await),
            LockMode::Exclusive => Guard::Exclusive(Arc::clone(&self.inner).write_owned().await),
        };
        Some(LockTicket { guard })
    }

    /// Returns true if both handles guard the same lock.
    pub fn same_as(&self, other: &MutationLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
