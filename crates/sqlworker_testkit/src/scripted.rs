//! Scripted engine for client tests.
//!
//! A [`ScriptedEngine`] speaks the engine protocol without SQLite: it
//! records every request on a shared [`Timeline`] and answers each one
//! after a fixed delay, concurrently with the others. Tests inspect the
//! timeline to check ordering and admission properties of the client.

use parking_lot::Mutex;
use sqlworker_protocol::{
    channel, ConnectReason, DatabaseInfo, EngineChannel, EngineEndpoint, EngineError, InputMessage,
    OutputMessage, OutputSender, QueryKey, ResultSet, StorageType, TransactionAction,
    TransactionKey,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One request as seen by a scripted engine.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    /// Label of the engine that received it.
    pub engine: String,
    /// Envelope kind.
    pub kind: &'static str,
    /// Correlation key, if any.
    pub key: Option<QueryKey>,
    /// Transaction session the request was tagged with.
    pub transaction_key: Option<TransactionKey>,
    /// Transaction step, for transaction envelopes.
    pub action: Option<TransactionAction>,
    /// SQL text, for queries.
    pub sql: Option<String>,
    /// When the engine received it.
    pub received: Instant,
    /// When the engine answered it.
    pub answered: Option<Instant>,
}

impl TimelineEntry {
    /// Returns true if both requests were in flight at the same time.
    ///
    /// Unanswered requests count as in flight forever.
    pub fn overlaps(&self, other: &TimelineEntry) -> bool {
        let self_end = self.answered.unwrap_or_else(far_future);
        let other_end = other.answered.unwrap_or_else(far_future);
        self.received < other_end && other.received < self_end
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

/// Shared, ordered record of requests received by scripted engines.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Arc<Mutex<Vec<TimelineEntry>>>,
}

impl Timeline {
    /// Creates an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all entries in arrival order.
    pub fn entries(&self) -> Vec<TimelineEntry> {
        self.entries.lock().clone()
    }

    /// Returns the entry kinds in arrival order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.entries.lock().iter().map(|e| e.kind).collect()
    }

    /// Returns the number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Waits until at least `count` entries were recorded.
    pub async fn wait_for(&self, count: usize) {
        let deadline = Instant::now() + crate::fixtures::EVENT_TIMEOUT;
        while self.len() < count {
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {count} timeline entries, have {}",
                self.len()
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Returns the spans during which a transaction session held the
    /// engine, from its begin until its commit or rollback was answered.
    pub fn transaction_spans(&self) -> Vec<(TransactionKey, Instant, Instant)> {
        let entries = self.entries.lock();
        let mut spans = Vec::new();
        for begin in entries
            .iter()
            .filter(|e| e.action == Some(TransactionAction::Begin))
        {
            let Some(tx) = begin.transaction_key else {
                continue;
            };
            let end = entries
                .iter()
                .filter(|e| {
                    e.transaction_key == Some(tx)
                        && matches!(
                            e.action,
                            Some(TransactionAction::Commit | TransactionAction::Rollback)
                        )
                })
                .filter_map(|e| e.answered)
                .max()
                .unwrap_or_else(far_future);
            spans.push((tx, begin.received, end));
        }
        spans
    }

    fn record(&self, engine: &str, message: &InputMessage) -> usize {
        let (action, sql) = match message {
            InputMessage::Transaction { action, .. } => (Some(*action), None),
            InputMessage::Query { statement, .. } => (None, Some(statement.sql.clone())),
            _ => (None, None),
        };
        let mut entries = self.entries.lock();
        entries.push(TimelineEntry {
            engine: engine.to_string(),
            kind: message.kind(),
            key: message.key(),
            transaction_key: message.transaction_key(),
            action,
            sql,
            received: Instant::now(),
            answered: None,
        });
        entries.len() - 1
    }

    fn mark_answered(&self, index: usize) {
        if let Some(entry) = self.entries.lock().get_mut(index) {
            entry.answered = Some(Instant::now());
        }
    }
}

/// Protocol-level stand-in for the SQLite engine.
#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    label: String,
    delay: Duration,
    silent: bool,
    timeline: Timeline,
    failing_actions: Vec<TransactionAction>,
    failing_sql: Option<String>,
}

impl ScriptedEngine {
    /// Creates an engine that answers after 5 ms.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            delay: Duration::from_millis(5),
            silent: false,
            timeline: Timeline::new(),
            failing_actions: Vec::new(),
            failing_sql: None,
        }
    }

    /// Sets the answer delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Records requests on `timeline` (shared with other engines).
    pub fn with_timeline(mut self, timeline: Timeline) -> Self {
        self.timeline = timeline;
        self
    }

    /// Never answers keyed requests. The handshake is still acknowledged.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Answers every transaction request with `action` with an error.
    pub fn failing_action(mut self, action: TransactionAction) -> Self {
        self.failing_actions.push(action);
        self
    }

    /// Answers every query whose SQL contains `marker` with an error.
    pub fn failing_sql(mut self, marker: impl Into<String>) -> Self {
        self.failing_sql = Some(marker.into());
        self
    }

    /// Starts the engine on the current runtime.
    ///
    /// Returns the client half of its channel and its timeline.
    pub fn start(self) -> (EngineChannel, Timeline) {
        let (client, endpoint) = channel();
        let timeline = self.timeline.clone();
        tokio::spawn(self.run(endpoint));
        (client, timeline)
    }

    async fn run(self, mut endpoint: EngineEndpoint) {
        let output = endpoint.sender();
        while let Some(message) = endpoint.recv().await {
            let index = self.timeline.record(&self.label, &message);
            let stop = matches!(message, InputMessage::Destroy { .. });

            match &message {
                InputMessage::Config(_) => {
                    self.timeline.mark_answered(index);
                    let _ = output.send(OutputMessage::Connect {
                        reason: ConnectReason::Initial,
                    });
                }
                InputMessage::Reinit { reason } => {
                    self.timeline.mark_answered(index);
                    let _ = output.send(OutputMessage::Connect { reason: *reason });
                }
                _ if self.silent => {}
                _ => {
                    let reply = match self.scripted_failure(&message) {
                        Some(key) => Some(OutputMessage::Error {
                            key: Some(key),
                            error: EngineError::new(format!("scripted {} failure", message.kind())),
                        }),
                        None => answer(&message),
                    };
                    if let Some(reply) = reply {
                        self.reply_later(index, reply, output.clone());
                    }
                }
            }

            if stop {
                break;
            }
        }
    }

    fn scripted_failure(&self, message: &InputMessage) -> Option<QueryKey> {
        match message {
            InputMessage::Transaction { key, action, .. }
                if self.failing_actions.contains(action) =>
            {
                Some(*key)
            }
            InputMessage::Query { key, statement, .. }
                if self
                    .failing_sql
                    .as_deref()
                    .is_some_and(|marker| statement.sql.contains(marker)) =>
            {
                Some(*key)
            }
            _ => None,
        }
    }

    fn reply_later(&self, index: usize, reply: OutputMessage, output: OutputSender) {
        let timeline = self.timeline.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            timeline.mark_answered(index);
            let _ = output.send(reply);
        });
    }
}

fn answer(message: &InputMessage) -> Option<OutputMessage> {
    let reply = match message {
        InputMessage::Config(_) | InputMessage::Reinit { .. } => return None,
        InputMessage::Query { key, .. } => OutputMessage::Data {
            key: *key,
            results: vec![ResultSet::empty()],
        },
        InputMessage::Batch { key, statements } => OutputMessage::Data {
            key: *key,
            results: vec![ResultSet::empty(); statements.len()],
        },
        InputMessage::GetInfo { key } => OutputMessage::Info {
            key: *key,
            info: DatabaseInfo {
                database_path: None,
                database_size_bytes: Some(0),
                storage_type: StorageType::Memory,
                persisted: false,
            },
        },
        InputMessage::Transaction { key, .. }
        | InputMessage::Function { key, .. }
        | InputMessage::Import { key, .. }
        | InputMessage::Export { key, .. }
        | InputMessage::Delete { key }
        | InputMessage::Destroy { key } => OutputMessage::Success { key: *key },
    };
    Some(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlworker_protocol::{EngineConfig, Statement};

    #[tokio::test]
    async fn handshake_and_answers_are_recorded() {
        let (client, timeline) = ScriptedEngine::new("a").start();
        let (requests, mut responses) = client.into_parts();

        requests
            .send(InputMessage::Config(EngineConfig::new(":memory:", ".")))
            .unwrap();
        assert!(matches!(
            responses.recv().await,
            Some(OutputMessage::Connect {
                reason: ConnectReason::Initial
            })
        ));

        let key = QueryKey::new();
        requests
            .send(InputMessage::Query {
                key,
                statement: Statement::new("SELECT 1"),
                transaction_key: None,
            })
            .unwrap();
        match responses.recv().await {
            Some(OutputMessage::Data { key: k, .. }) => assert_eq!(k, key),
            other => panic!("unexpected {other:?}"),
        }

        let entries = timeline.entries();
        assert_eq!(timeline.kinds(), vec!["config", "query"]);
        assert_eq!(entries[1].sql.as_deref(), Some("SELECT 1"));
        assert!(entries[1].answered.unwrap() >= entries[1].received);
    }

    #[tokio::test]
    async fn silent_engine_never_answers() {
        let (client, timeline) = ScriptedEngine::new("quiet").silent().start();
        let (requests, mut responses) = client.into_parts();
        requests
            .send(InputMessage::GetInfo {
                key: QueryKey::new(),
            })
            .unwrap();
        timeline.wait_for(1).await;

        let waited =
            tokio::time::timeout(Duration::from_millis(50), responses.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn scripted_failures_answer_with_errors() {
        let (client, _) = ScriptedEngine::new("failing")
            .failing_action(TransactionAction::Commit)
            .failing_sql("BROKEN")
            .start();
        let (requests, mut responses) = client.into_parts();

        let commit = QueryKey::new();
        requests
            .send(InputMessage::Transaction {
                key: commit,
                transaction_key: TransactionKey::new(),
                action: TransactionAction::Commit,
            })
            .unwrap();
        match responses.recv().await {
            Some(OutputMessage::Error { key, error }) => {
                assert_eq!(key, Some(commit));
                assert!(error.message.contains("transaction"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let query = QueryKey::new();
        requests
            .send(InputMessage::Query {
                key: query,
                statement: Statement::new("SELECT BROKEN"),
                transaction_key: None,
            })
            .unwrap();
        assert!(matches!(
            responses.recv().await,
            Some(OutputMessage::Error { key: Some(k), .. }) if k == query
        ));
    }

    #[test]
    fn overlap_detection() {
        let start = Instant::now();
        let entry = |from: u64, to: u64| TimelineEntry {
            engine: "e".into(),
            kind: "query",
            key: None,
            transaction_key: None,
            action: None,
            sql: None,
            received: start + Duration::from_millis(from),
            answered: Some(start + Duration::from_millis(to)),
        };
        assert!(entry(0, 10).overlaps(&entry(5, 15)));
        assert!(!entry(0, 10).overlaps(&entry(10, 20)));
        assert!(!entry(20, 30).overlaps(&entry(0, 10)));
    }
}
