//! # SQLWorker Engine
//!
//! Background SQL engine for SQLWorker clients.
//!
//! The engine owns one SQLite connection on a dedicated OS thread and talks
//! to its client only through the ordered envelope channel from
//! `sqlworker_protocol`. It never shares memory with the client apart from
//! the [`FunctionProxy`](sqlworker_protocol::FunctionProxy) it is handed at
//! spawn time.
//!
//! ## Request handling
//!
//! - Requests are handled one at a time, in arrival order
//! - While a transaction session is open, every request not tagged with its
//!   key is deferred and replayed in arrival order once it settles
//! - `Destroy` is never deferred: it rolls back, closes, and stops the thread
//! - A request that fails is answered with an `Error` echoing its key;
//!   failures with no request to blame (opening the database during the
//!   handshake or a reinit) are sent without a key
//!
//! ## Multi-statement SQL
//!
//! One request may carry several statements. At most one of them may take
//! parameters; they all run in order and the last result set is returned.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod convert;
mod error;
mod exec;
mod processor;
mod worker;

pub use error::{WorkerError, WorkerResult};
pub use worker::{Engine, EngineHandle};

/// The 16-byte header every SQLite database file starts with.
pub const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
