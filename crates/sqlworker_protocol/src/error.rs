//! Error types for the protocol layer.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised by the message channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The other side of the channel is gone.
    #[error("channel closed: {0} side disconnected")]
    ChannelClosed(&'static str),
}
