//! # SQLWorker Protocol
//!
//! Message envelopes exchanged between a SQLWorker client and its engine.
//!
//! This crate provides:
//! - Correlation, transaction, and client keys
//! - SQL values, statements, and result sets
//! - `InputMessage` (client → engine) and `OutputMessage` (engine → client)
//! - The engine configuration carried by the initial handshake
//! - The `FunctionProxy` seam the engine uses to call client-owned functions
//! - An ordered, in-process channel pair connecting the two sides
//!
//! Envelopes are closed enums; every consumer matches them exhaustively.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod config;
mod error;
mod key;
mod message;
mod proxy;
mod statement;
mod value;

pub use channel::{
    channel, EngineChannel, EngineEndpoint, OutputSender, RequestSender, ResponseReceiver,
};
pub use config::{EngineConfig, MEMORY_DATABASE};
pub use error::{ProtocolError, ProtocolResult};
pub use key::{ClientKey, QueryKey, TransactionKey};
pub use message::{
    ConnectReason, DatabaseInfo, EngineError, FunctionKind, InputMessage, OutputMessage,
    StorageType, TransactionAction,
};
pub use proxy::{FunctionProxy, NoFunctions};
pub use statement::{Method, Record, ResultSet, Statement};
pub use value::Value;
