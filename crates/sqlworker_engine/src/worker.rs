//! Dedicated engine thread.

use crate::error::{WorkerError, WorkerResult};
use crate::processor::{Flow, Processor};
use sqlworker_protocol::{EngineEndpoint, FunctionProxy};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

const THREAD_NAME: &str = "sqlworker-engine";

/// Entry point for starting engines.
pub struct Engine;

impl Engine {
    /// Starts an engine on its own OS thread.
    ///
    /// The engine waits for a `Config` handshake before opening anything and
    /// stops after answering `Destroy` or when every client sender is gone.
    /// Scalar functions are answered through `proxy`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] if the thread cannot be created.
    pub fn spawn(
        endpoint: EngineEndpoint,
        proxy: Arc<dyn FunctionProxy>,
    ) -> WorkerResult<EngineHandle> {
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(endpoint, proxy))
            .map_err(WorkerError::Spawn)?;
        Ok(EngineHandle { thread })
    }
}

fn run(mut endpoint: EngineEndpoint, proxy: Arc<dyn FunctionProxy>) {
    let mut processor = Processor::new(endpoint.sender(), proxy);
    while let Some(message) = endpoint.blocking_recv() {
        if processor.handle(message) == Flow::Stop {
            break;
        }
    }
    debug!("engine thread exiting");
}

/// Handle to a running engine thread.
#[derive(Debug)]
pub struct EngineHandle {
    thread: JoinHandle<()>,
}

impl EngineHandle {
    /// Returns true once the engine thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the engine thread to exit.
    ///
    /// # Errors
    ///
    /// Returns the panic payload if the engine thread panicked.
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}
