//! Pending call table keyed by correlation key.

use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use sqlworker_protocol::{DatabaseInfo, QueryKey, ResultSet};
use std::collections::HashMap;
use tokio::sync::oneshot;

/// Terminal engine reply for one request.
#[derive(Debug)]
pub(crate) enum Reply {
    Success,
    Data(Vec<ResultSet>),
    Info(DatabaseInfo),
}

type Completion = oneshot::Sender<ClientResult<Reply>>;

/// Maps in-flight request keys to their completion handles.
///
/// Every entry is removed exactly once: by its reply, or by [`Registry::clear_all`].
#[derive(Default)]
pub(crate) struct Registry {
    pending: Mutex<HashMap<QueryKey, Completion>>,
}

impl Registry {
    pub(crate) fn register(&self, key: QueryKey) -> oneshot::Receiver<ClientResult<Reply>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(key, tx);
        rx
    }

    /// Completes `key` with a reply. Absent keys are ignored.
    pub(crate) fn resolve(&self, key: QueryKey, reply: Reply) -> bool {
        self.complete(key, Ok(reply))
    }

    /// Completes `key` with an error.
    ///
    /// Returns false if nobody was waiting for `key`.
    pub(crate) fn reject(&self, key: QueryKey, error: ClientError) -> bool {
        self.complete(key, Err(error))
    }

    pub(crate) fn remove(&self, key: QueryKey) {
        self.pending.lock().remove(&key);
    }

    /// Drops every entry without completing it.
    pub(crate) fn clear_all(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    /// Completes every entry with an error built by `make`.
    pub(crate) fn fail_all(&self, make: impl Fn() -> ClientError) -> usize {
        let drained: Vec<Completion> = self.pending.lock().drain().map(|(_, tx)| tx).collect();
        let count = drained.len();
        for tx in drained {
            let _ = tx.send(Err(make()));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }

    fn complete(&self, key: QueryKey, result: ClientResult<Reply>) -> bool {
        let Some(tx) = self.pending.lock().remove(&key) else {
            return false;
        };
        // The caller may have given up waiting; the entry is consumed either way.
        let _ = tx.send(result);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlworker_protocol::EngineError;

    #[tokio::test]
    async fn resolve_completes_once() {
        let registry = Registry::default();
        let key = QueryKey::new();
        let rx = registry.register(key);

        assert!(registry.resolve(key, Reply::Success));
        assert!(!registry.resolve(key, Reply::Success));
        assert!(matches!(rx.await.unwrap(), Ok(Reply::Success)));
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn reject_delivers_engine_error() {
        let registry = Registry::default();
        let key = QueryKey::new();
        let rx = registry.register(key);

        assert!(registry.reject(key, EngineError::new("boom").into()));
        match rx.await.unwrap() {
            Err(ClientError::Engine(err)) => assert_eq!(err.message, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reject_of_absent_key_is_reported() {
        let registry = Registry::default();
        assert!(!registry.reject(QueryKey::new(), ClientError::ChannelClosed));
    }

    #[tokio::test]
    async fn clear_all_leaves_callers_unsettled() {
        let registry = Registry::default();
        let receivers: Vec<_> = (0..3).map(|_| registry.register(QueryKey::new())).collect();

        assert_eq!(registry.clear_all(), 3);
        assert_eq!(registry.len(), 0);
        for rx in receivers {
            // Dropped without a value: nothing was delivered.
            assert!(rx.await.is_err());
        }
    }

    #[tokio::test]
    async fn fail_all_rejects_everyone() {
        let registry = Registry::default();
        let a = registry.register(QueryKey::new());
        let b = registry.register(QueryKey::new());

        assert_eq!(registry.fail_all(|| ClientError::ChannelClosed), 2);
        assert!(matches!(a.await.unwrap(), Err(ClientError::ChannelClosed)));
        assert!(matches!(b.await.unwrap(), Err(ClientError::ChannelClosed)));
    }
}
