//! Bidirectional channel trait abstraction.
//!
//! The connection manager never touches sockets directly. A
//! [`ChannelTransport`] opens a [`Channel`], a pair of text-frame queues, and
//! the manager drives everything else. Production code uses the
//! tokio-tungstenite adapter; tests use the mock transport.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Channel transport errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Connection timeout
    #[error("Connection timeout: {0}")]
    Timeout(String),
    /// The channel is closed
    #[error("Disconnected from server")]
    Disconnected,
    /// Failed to send a frame
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// An open channel.
///
/// Frames written to `outbound` are sent to the server in order. Frames
/// from the server arrive on `inbound`; `inbound` yielding `None` means the
/// channel closed. Dropping `outbound` asks the transport to close it.
#[derive(Debug)]
pub struct Channel {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

impl Channel {
    /// Write a text frame.
    pub fn send(&self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Disconnected)
    }
}

/// Trait for opening channels to the backend.
///
/// # Example
///
/// ```ignore
/// use nutrilink::traits::ChannelTransport;
///
/// async fn hello<T: ChannelTransport>(transport: &T) -> Result<(), TransportError> {
///     let mut channel = transport.open("wss://api.example.com/realtime").await?;
///     channel.send(r#"{"type":"ping","data":null,"timestamp":0}"#.to_string())?;
///     let reply = channel.inbound.recv().await;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open a new channel to `url`.
    async fn open(&self, url: &str) -> Result<Channel, TransportError>;
}
