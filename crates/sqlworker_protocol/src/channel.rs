//! Ordered in-process channel between a client and its engine.
//!
//! Both directions are unbounded and FIFO: requests reach the engine in
//! send order and responses reach the client in emit order.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{InputMessage, OutputMessage};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Creates a connected client/engine channel pair.
#[must_use]
pub fn channel() -> (EngineChannel, EngineEndpoint) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();

    let client = EngineChannel {
        requests: RequestSender(request_tx),
        responses: ResponseReceiver(response_rx),
    };
    let engine = EngineEndpoint {
        requests: request_rx,
        responses: OutputSender(response_tx),
    };
    (client, engine)
}

/// Client half of the channel.
#[derive(Debug)]
pub struct EngineChannel {
    requests: RequestSender,
    responses: ResponseReceiver,
}

impl EngineChannel {
    /// Splits into the request sender and the response receiver.
    #[must_use]
    pub fn into_parts(self) -> (RequestSender, ResponseReceiver) {
        (self.requests, self.responses)
    }
}

/// Sends requests to the engine. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RequestSender(UnboundedSender<InputMessage>);

impl RequestSender {
    /// Queues a request for the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ChannelClosed`] if the engine is gone.
    pub fn send(&self, message: InputMessage) -> ProtocolResult<()> {
        self.0
            .send(message)
            .map_err(|_| ProtocolError::ChannelClosed("engine"))
    }

    /// Returns true if the engine dropped its endpoint.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Receives engine output on the client side.
#[derive(Debug)]
pub struct ResponseReceiver(UnboundedReceiver<OutputMessage>);

impl ResponseReceiver {
    /// Waits for the next engine message; `None` once the engine is gone.
    pub async fn recv(&mut self) -> Option<OutputMessage> {
        self.0.recv().await
    }
}

/// Engine half of the channel.
#[derive(Debug)]
pub struct EngineEndpoint {
    requests: UnboundedReceiver<InputMessage>,
    responses: OutputSender,
}

impl EngineEndpoint {
    /// Waits for the next request; `None` once every client sender is gone.
    pub async fn recv(&mut self) -> Option<InputMessage> {
        self.requests.recv().await
    }

    /// Blocking variant of [`Self::recv`] for dedicated engine threads.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<InputMessage> {
        self.requests.blocking_recv()
    }

    /// Sends a message to the client.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ChannelClosed`] if the client is gone.
    pub fn send(&self, message: OutputMessage) -> ProtocolResult<()> {
        self.responses.send(message)
    }

    /// Returns a cloneable sender for output produced outside the request
    /// loop, such as callback relays fired mid-statement.
    #[must_use]
    pub fn sender(&self) -> OutputSender {
        self.responses.clone()
    }
}

/// Sends engine output to the client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OutputSender(UnboundedSender<OutputMessage>);

impl OutputSender {
    /// Sends a message to the client.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ChannelClosed`] if the client is gone.
    pub fn send(&self, message: OutputMessage) -> ProtocolResult<()> {
        self.0
            .send(message)
            .map_err(|_| ProtocolError::ChannelClosed("client"))
    }
}
