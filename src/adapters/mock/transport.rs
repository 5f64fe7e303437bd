//! Mock channel transport for testing.
//!
//! Every successful `open` produces a [`MockPeer`], the server side of the
//! channel. Tests pull peers with [`MockTransport::accept`] and talk to the
//! client through them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::connection::WireMessage;
use crate::traits::{Channel, ChannelTransport, TransportError};

/// Mock transport with switchable reachability.
///
/// # Example
///
/// ```ignore
/// use nutrilink::adapters::mock::MockTransport;
///
/// let transport = Arc::new(MockTransport::new());
/// let manager = ConnectionManager::create(config, transport.clone());
/// manager.connect()?;
///
/// let mut peer = transport.accept().await.unwrap();
/// peer.send_message(&WireMessage::new("system_status", json!({"status": "ok"})));
/// ```
#[derive(Debug)]
pub struct MockTransport {
    reachable: AtomicBool,
    open_delay: StdMutex<Duration>,
    opens: AtomicUsize,
    peers_tx: mpsc::UnboundedSender<MockPeer>,
    peers_rx: Mutex<mpsc::UnboundedReceiver<MockPeer>>,
}

impl MockTransport {
    /// Transport whose opens succeed.
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            reachable: AtomicBool::new(true),
            open_delay: StdMutex::new(Duration::ZERO),
            opens: AtomicUsize::new(0),
            peers_tx,
            peers_rx: Mutex::new(peers_rx),
        }
    }

    /// Transport whose opens fail until [`set_reachable`](Self::set_reachable).
    pub fn unreachable() -> Self {
        let transport = Self::new();
        transport.set_reachable(false);
        transport
    }

    /// Delay every open by `delay`.
    pub fn with_open_delay(self, delay: Duration) -> Self {
        *self
            .open_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of open attempts, failed ones included.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Wait for the next channel the client opens.
    ///
    /// Peers are queued, so a channel opened before this call is still
    /// returned.
    pub async fn accept(&self) -> Option<MockPeer> {
        self.peers_rx.lock().await.recv().await
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn open(&self, url: &str) -> Result<Channel, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let delay = *self
            .open_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "{} is unreachable",
                url
            )));
        }

        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        let peer = MockPeer {
            url: url.to_string(),
            outbound: server_tx,
            inbound: server_rx,
        };
        self.peers_tx
            .send(peer)
            .map_err(|_| TransportError::ConnectionFailed("mock transport closed".into()))?;

        Ok(Channel {
            outbound: client_tx,
            inbound: client_rx,
        })
    }
}

/// Server side of a mock channel.
///
/// Dropping the peer closes the channel from the server side.
#[derive(Debug)]
pub struct MockPeer {
    url: String,
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl MockPeer {
    /// URL the client opened.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next frame from the client. `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Next frame from the client, parsed. Unparseable frames are skipped.
    pub async fn recv_message(&mut self) -> Option<WireMessage> {
        while let Some(frame) = self.inbound.recv().await {
            if let Ok(message) = WireMessage::parse(&frame) {
                return Some(message);
            }
        }
        None
    }

    /// Frame already sent by the client, without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.inbound.try_recv().ok()
    }

    /// Push a raw frame to the client. Returns false if the client is gone.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.outbound.send(frame.into()).is_ok()
    }

    /// Push a message to the client.
    pub fn send_message(&self, message: &WireMessage) -> bool {
        match message.to_json() {
            Ok(frame) => self.send(frame),
            Err(_) => false,
        }
    }
}
