//! Framed duplex transport seen by the session core.
//!
//! The core never touches a socket directly: a connection is a [`FrameReader`] owned
//! by its read loop and a shareable [`FrameWriter`]. The WebSocket implementation lives
//! in [`crate::server::ws_bridge`].

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Peer went away. `normal` distinguishes a clean close from an abnormal drop;
    /// both are treated identically for teardown.
    #[error("connection closed (normal={normal})")]
    Closed { normal: bool },
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn is_normal_close(&self) -> bool {
        matches!(self, TransportError::Closed { normal: true })
    }
}

#[async_trait]
pub trait FrameReader: Send {
    /// Wait for the next inbound frame.
    async fn read_frame(&mut self) -> Result<Vec<u8>, TransportError>;
}

#[async_trait]
pub trait FrameWriter: Send + Sync {
    async fn write_frame(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Close the underlying connection. Idempotent.
    async fn close(&self);
}
