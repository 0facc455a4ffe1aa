//! Transaction sessions.
//!
//! A session owns an exclusive mutation-lock ticket from begin until it
//! commits, rolls back, or is dropped. Its statements carry the session key
//! and bypass the lock, so nothing else reaches the engine in between.

use crate::client::{first_result, Client};
use crate::error::{ClientError, ClientResult};
use crate::lock::{LockMode, LockTicket};
use parking_lot::Mutex;
use sqlworker_protocol::{InputMessage, ResultSet, Statement, TransactionAction, TransactionKey, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle of a transaction session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Open; statements may be added.
    Begun,
    /// Commit round trip in flight.
    Committing,
    /// Committed.
    Committed,
    /// Rolled back.
    RolledBack,
}

impl TransactionState {
    /// Returns true if no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }
}

/// Cloneable handle for running statements inside a session.
///
/// Handed to the body of [`Client::transaction`].
#[derive(Clone)]
pub struct TransactionScope {
    client: Client,
    key: TransactionKey,
    state: Arc<Mutex<TransactionState>>,
}

impl TransactionScope {
    /// Returns the session key.
    pub fn key(&self) -> TransactionKey {
        self.key
    }

    /// Returns the current state.
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Runs `sql` with positional `params` inside the session.
    pub async fn query(
        &self,
        sql: &str,
        params: impl IntoIterator<Item = Value>,
    ) -> ClientResult<ResultSet> {
        self.execute(Statement::new(sql).with_params(params.into_iter().collect()))
            .await
    }

    /// Runs `statement` inside the session.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::TransactionState`] unless the session is open.
    pub async fn execute(&self, statement: Statement) -> ClientResult<ResultSet> {
        let state = self.state();
        if state != TransactionState::Begun {
            return Err(ClientError::transition(state, "query"));
        }
        let transaction_key = self.key;
        let reply = self
            .client
            .round_trip(LockMode::Exclusive, true, |key| InputMessage::Query {
                key,
                statement,
                transaction_key: Some(transaction_key),
            })
            .await?;
        first_result(reply)
    }

    fn set(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    async fn send_action(&self, action: TransactionAction) -> ClientResult<()> {
        let transaction_key = self.key;
        self.client
            .round_trip(LockMode::Exclusive, true, |key| InputMessage::Transaction {
                key,
                transaction_key,
                action,
            })
            .await
            .map(|_| ())
    }
}

/// An open transaction session.
///
/// Dropping it while still open sends a rollback without waiting for the
/// reply and releases the lock.
pub struct Transaction {
    scope: TransactionScope,
    ticket: Option<LockTicket>,
}

impl Transaction {
    pub(crate) fn new(client: Client, key: TransactionKey, ticket: Option<LockTicket>) -> Self {
        Self {
            scope: TransactionScope {
                client,
                key,
                state: Arc::new(Mutex::new(TransactionState::Begun)),
            },
            ticket,
        }
    }

    /// Returns the session key.
    pub fn key(&self) -> TransactionKey {
        self.scope.key
    }

    /// Returns the current state.
    pub fn state(&self) -> TransactionState {
        self.scope.state()
    }

    /// Returns true while the session holds its exclusive lock ticket.
    pub fn holds_lock(&self) -> bool {
        self.ticket.is_some()
    }

    /// Returns a cloneable handle for running statements.
    pub fn scope(&self) -> TransactionScope {
        self.scope.clone()
    }

    /// Runs `sql` with positional `params` inside the session.
    pub async fn query(
        &self,
        sql: &str,
        params: impl IntoIterator<Item = Value>,
    ) -> ClientResult<ResultSet> {
        self.scope.query(sql, params).await
    }

    /// Runs `statement` inside the session.
    pub async fn execute(&self, statement: Statement) -> ClientResult<ResultSet> {
        self.scope.execute(statement).await
    }

    /// Commits the session and releases the lock.
    ///
    /// A failed commit leaves the session open so it can still be rolled back.
    pub async fn commit(&mut self) -> ClientResult<()> {
        {
            let mut state = self.scope.state.lock();
            if *state != TransactionState::Begun {
                return Err(ClientError::transition(*state, "commit"));
            }
            *state = TransactionState::Committing;
        }

        match self.scope.send_action(TransactionAction::Commit).await {
            Ok(()) => {
                self.scope.set(TransactionState::Committed);
                self.ticket = None;
                debug!(transaction = %self.scope.key, "transaction committed");
                Ok(())
            }
            Err(err) => {
                self.scope.set(TransactionState::Begun);
                Err(err)
            }
        }
    }

    /// Rolls the session back and releases the lock.
    pub async fn rollback(&mut self) -> ClientResult<()> {
        let state = self.state();
        if state != TransactionState::Begun {
            return Err(ClientError::transition(state, "rollback"));
        }

        self.scope.send_action(TransactionAction::Rollback).await?;
        self.scope.set(TransactionState::RolledBack);
        self.ticket = None;
        debug!(transaction = %self.scope.key, "transaction rolled back");
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state().is_terminal() {
            return;
        }
        let transaction_key = self.scope.key;
        debug!(transaction = %transaction_key, "open transaction dropped, rolling back");
        let sent = self
            .scope
            .client
            .send_detached(|key| InputMessage::Transaction {
                key,
                transaction_key,
                action: TransactionAction::Rollback,
            });
        if let Err(err) = sent {
            warn!(transaction = %transaction_key, error = %err, "could not send rollback");
        }
        self.scope.set(TransactionState::RolledBack);
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("key", &self.scope.key)
            .field("state", &self.state())
            .finish()
    }
}
