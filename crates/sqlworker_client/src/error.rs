//! Error types for the client.

use sqlworker_protocol::EngineError;
use sqlworker_storage::StoreError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by [`Client`](crate::Client) calls.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The client never attached to an engine.
    #[error("client is not connected to an engine")]
    NotConnected,

    /// The client was destroyed.
    #[error("client has been destroyed")]
    Destroyed,

    /// The engine rejected the request. The payload is passed through unchanged.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The engine failed outside any request; the client is unusable.
    #[error("engine fault: {0}")]
    Fault(String),

    /// A transaction step is not allowed in the current state.
    #[error("invalid transaction transition from {from} to {to}")]
    TransactionState {
        /// Current state.
        from: String,
        /// Attempted step.
        to: String,
    },

    /// A function with this name is already registered.
    #[error("function {0:?} is already registered")]
    FunctionExists(String),

    /// The durable store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A `before_unlock` hook failed.
    #[error("before-unlock hook failed: {0}")]
    Hook(String),

    /// The engine endpoint went away.
    #[error("engine channel closed")]
    ChannelClosed,

    /// The engine answered with a reply of the wrong kind.
    #[error("unexpected {0} reply from engine")]
    UnexpectedReply(&'static str),
}

impl ClientError {
    /// Creates an invalid transaction transition error.
    pub fn transition(from: impl std::fmt::Debug, to: &str) -> Self {
        ClientError::TransactionState {
            from: format!("{from:?}"),
            to: to.to_string(),
        }
    }

    /// Returns true if the client can no longer be used.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClientError::NotConnected
                | ClientError::Destroyed
                | ClientError::Fault(_)
                | ClientError::ChannelClosed
        )
    }

    /// Returns the engine payload, if the engine rejected the request.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            ClientError::Engine(err) => Some(err),
            _ => None,
        }
    }
}
