//! Transport abstraction for the gateway connection.

use async_trait::async_trait;
use thiserror::Error;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Endpoint discovery failed: {0}")]
    Discovery(String),
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Receive failed: {0}")]
    Receive(String),
    #[error("Transport closed")]
    Closed,
}

/// An open, full-duplex text-frame stream.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Next text frame. `None` once the stream is closed.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the stream. Errors are ignored.
    async fn close(&mut self);
}

/// Resolves the gateway endpoint and opens a [`Transport`] to it.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;
}

#[async_trait]
impl<T: Connector + ?Sized> Connector for std::sync::Arc<T> {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        (**self).connect().await
    }
}
