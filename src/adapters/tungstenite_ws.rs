//! Tungstenite-based channel transport.
//!
//! Opens a WebSocket with tokio-tungstenite and bridges it to a
//! [`Channel`]: a background task moves text frames between the socket and
//! the channel queues until either side closes.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::traits::{Channel, ChannelTransport, TransportError};

/// WebSocket transport using tokio-tungstenite.
///
/// # Example
///
/// ```ignore
/// use nutrilink::adapters::TungsteniteTransport;
/// use nutrilink::connection::ConnectionManager;
///
/// let manager = ConnectionManager::create(config, Arc::new(TungsteniteTransport::new()));
/// manager.connect()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelTransport for TungsteniteTransport {
    async fn open(&self, url: &str) -> Result<Channel, TransportError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        info!("Connected to WebSocket server at {}", url);

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let url = url.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = ws_stream.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if inbound_tx.send(text).is_err() {
                                    debug!("Channel receiver dropped, closing socket");
                                    let _ = ws_sink.close().await;
                                    break;
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                debug!("Received ping, sending pong");
                                let _ = ws_sink.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Close(_))) => {
                                info!("Received close frame from server");
                                break;
                            }
                            Some(Ok(_)) => {
                                // Binary and pong frames carry nothing for us
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error: {}", e);
                                break;
                            }
                            None => {
                                info!("WebSocket stream ended");
                                break;
                            }
                        }
                    }
                    frame = outbound_rx.recv() => {
                        match frame {
                            Some(text) => {
                                if let Err(e) = ws_sink.send(Message::Text(text)).await {
                                    warn!("Failed to send frame: {}", e);
                                    break;
                                }
                            }
                            None => {
                                debug!("Channel sender dropped, closing socket");
                                let _ = ws_sink.close().await;
                                break;
                            }
                        }
                    }
                }
            }
            info!("Connection to {} closed", url);
        });

        Ok(Channel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
