//! The connection manager actor.
//!
//! [`ConnectionManager`] is a handle; the state lives in a single spawned
//! task that owns the channel, the desired subscriptions, the outbound queue
//! and every timer. Handle methods send commands to that task, so all state
//! transitions are serialized.

use std::collections::VecDeque;
use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::events::ConnectionEvent;
use super::history::{HistoryCategory, RollingHistory};
use super::messages::{InboundMessage, OutboundMessage, WireMessage, PING, PONG};
use super::state::ConnectionState;
use crate::config::ConnectionConfig;
use crate::error::{AnalyticsEvent, ErrorClassifier, RawError};
use crate::traits::{Channel, ChannelTransport, TransportError};

const EVENT_CAPACITY: usize = 256;

/// Errors returned by the manager handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Connection manager has been disposed")]
    Disposed,
}

enum Command {
    Connect,
    Disconnect(oneshot::Sender<()>),
    Reconnect,
    Send(OutboundMessage),
    Subscribe(String),
    Unsubscribe(String),
    QueuedMessages(oneshot::Sender<Vec<WireMessage>>),
    Subscriptions(oneshot::Sender<Vec<String>>),
    History(HistoryCategory, oneshot::Sender<Vec<InboundMessage>>),
    Dispose,
}

/// Handle to a connection manager task.
///
/// # Example
///
/// ```ignore
/// use nutrilink::connection::{ConnectionManager, ConnectionEvent};
///
/// let manager = ConnectionManager::create(config, transport);
/// let mut events = manager.events();
/// manager.subscribe("glucose")?;
/// manager.connect()?;
///
/// while let Ok(event) = events.recv().await {
///     if let ConnectionEvent::HealthMetricsUpdate(metric) = event {
///         println!("{} = {}", metric.metric, metric.value);
///     }
/// }
/// ```
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    offline: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawn a manager in the `Disconnected` state.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(config: ConnectionConfig, transport: Arc<dyn ChannelTransport>) -> Self {
        Self::spawn(config, transport, None)
    }

    /// Like [`create`](Self::create), additionally classifying malformed
    /// inbound frames and reporting connection events to the classifier's
    /// recorder.
    pub fn create_with_classifier(
        config: ConnectionConfig,
        transport: Arc<dyn ChannelTransport>,
        classifier: Arc<ErrorClassifier>,
    ) -> Self {
        Self::spawn(config, transport, Some(classifier))
    }

    fn spawn(
        config: ConnectionConfig,
        transport: Arc<dyn ChannelTransport>,
        classifier: Option<Arc<ErrorClassifier>>,
    ) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let offline = Arc::new(AtomicBool::new(false));

        let actor = Actor {
            history: RollingHistory::new(config.history_limit),
            config,
            transport,
            classifier,
            commands: commands_rx,
            state_tx,
            events: events_tx.clone(),
            offline: offline.clone(),
            channel: None,
            pending_open: None,
            subscriptions: Vec::new(),
            outbox: VecDeque::new(),
            attempts: 0,
            reconnect_at: None,
            next_ping_at: None,
            pong_deadline: None,
        };
        let task = tokio::spawn(actor.run());

        Self {
            commands,
            state_rx,
            events_tx,
            offline,
            task,
        }
    }

    /// Open the channel. No-op while connected or connecting.
    pub fn connect(&self) -> Result<(), ConnectionError> {
        self.command(Command::Connect)
    }

    /// Close the channel and stop automatic reconnection.
    ///
    /// Returns once the manager is `Disconnected`.
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Disconnect(tx))?;
        rx.await.map_err(|_| ConnectionError::Disposed)
    }

    /// Drop any current channel, reset the attempt counter and connect.
    pub fn reconnect(&self) -> Result<(), ConnectionError> {
        self.command(Command::Reconnect)
    }

    /// Write `message` now if connected, otherwise queue it.
    pub fn send(&self, message: OutboundMessage) -> Result<(), ConnectionError> {
        self.command(Command::Send(message))
    }

    pub fn subscribe(&self, topic: impl Into<String>) -> Result<(), ConnectionError> {
        self.command(Command::Subscribe(topic.into()))
    }

    pub fn unsubscribe(&self, topic: impl Into<String>) -> Result<(), ConnectionError> {
        self.command(Command::Unsubscribe(topic.into()))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Subscribe to events. Receivers that fall behind by more than the
    /// channel capacity lose the oldest events.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events_tx.subscribe()
    }

    /// True after automatic reconnection gave up, until the next explicit
    /// `connect()`/`reconnect()`.
    pub fn offline_indicator(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Messages waiting for the next connection, oldest first.
    pub async fn queued_messages(&self) -> Result<Vec<WireMessage>, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::QueuedMessages(tx))?;
        rx.await.map_err(|_| ConnectionError::Disposed)
    }

    /// Desired subscriptions in the order they were added.
    pub async fn subscriptions(&self) -> Result<Vec<String>, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Subscriptions(tx))?;
        rx.await.map_err(|_| ConnectionError::Disposed)
    }

    /// Recent inbound messages of `category`, oldest first.
    pub async fn history(
        &self,
        category: HistoryCategory,
    ) -> Result<Vec<InboundMessage>, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::History(category, tx))?;
        rx.await.map_err(|_| ConnectionError::Disposed)
    }

    /// Stop the manager task and close the channel.
    pub async fn dispose(self) {
        let _ = self.commands.send(Command::Dispose);
        if let Err(e) = self.task.await {
            error!("Connection manager task failed: {}", e);
        }
    }

    fn command(&self, command: Command) -> Result<(), ConnectionError> {
        self.commands
            .send(command)
            .map_err(|_| ConnectionError::Disposed)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("offline", &self.offline_indicator())
            .finish()
    }
}

type PendingOpen = BoxFuture<'static, Result<Channel, TransportError>>;

struct Actor {
    config: ConnectionConfig,
    transport: Arc<dyn ChannelTransport>,
    classifier: Option<Arc<ErrorClassifier>>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    offline: Arc<AtomicBool>,
    channel: Option<Channel>,
    pending_open: Option<PendingOpen>,
    subscriptions: Vec<String>,
    outbox: VecDeque<WireMessage>,
    history: RollingHistory,
    /// Scheduled reconnects in the current cycle
    attempts: u32,
    reconnect_at: Option<Instant>,
    next_ping_at: Option<Instant>,
    pong_deadline: Option<Instant>,
}

impl Actor {
    async fn run(mut self) {
        loop {
            // Frames that already arrived are handled before any deadline fires.
            tokio::select! {
                biased;

                frame = next_frame(&mut self.channel) => match frame {
                    Some(frame) => self.on_frame(&frame),
                    None => self.on_channel_lost("channel closed by server"),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Dispose) | None => break,
                    Some(command) => self.handle_command(command),
                },
                result = open_result(&mut self.pending_open) => self.on_open_finished(result),
                _ = sleep_until_opt(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.begin_open();
                }
                _ = sleep_until_opt(self.next_ping_at) => self.send_ping(),
                _ = sleep_until_opt(self.pong_deadline) => {
                    warn!(
                        "No pong within {:?}, treating channel as dead",
                        self.config.pong_timeout
                    );
                    self.on_channel_lost("liveness probe timed out");
                }
            }
        }

        self.close_channel();
        self.set_state(ConnectionState::Disconnected);
        info!("Connection manager stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                if matches!(
                    self.state(),
                    ConnectionState::Connected | ConnectionState::Connecting
                ) {
                    debug!("connect() ignored while {}", self.state());
                    return;
                }
                self.start_cycle();
                self.begin_open();
            }
            Command::Disconnect(done) => {
                self.disconnect();
                let _ = done.send(());
            }
            Command::Reconnect => {
                info!("Manual reconnect requested");
                let was_connected = self.state().is_connected();
                self.close_channel();
                if was_connected {
                    self.emit(ConnectionEvent::Disconnected {
                        reason: "reconnect requested".to_string(),
                    });
                }
                self.start_cycle();
                self.begin_open();
            }
            Command::Send(message) => self.send(message.into_wire()),
            Command::Subscribe(topic) => {
                if self.subscriptions.contains(&topic) {
                    return;
                }
                self.subscriptions.push(topic.clone());
                if self.state().is_connected() {
                    self.write_or_drop(OutboundMessage::Subscribe { topic }.into_wire());
                }
            }
            Command::Unsubscribe(topic) => {
                let before = self.subscriptions.len();
                self.subscriptions.retain(|t| t != &topic);
                if self.subscriptions.len() != before && self.state().is_connected() {
                    self.write_or_drop(OutboundMessage::Unsubscribe { topic }.into_wire());
                }
            }
            Command::QueuedMessages(reply) => {
                let _ = reply.send(self.outbox.iter().cloned().collect());
            }
            Command::Subscriptions(reply) => {
                let _ = reply.send(self.subscriptions.clone());
            }
            Command::History(category, reply) => {
                let _ = reply.send(self.history.get(category));
            }
            Command::Dispose => {}
        }
    }

    /// Explicit connect/reconnect: fresh attempt budget, indicator cleared.
    fn start_cycle(&mut self) {
        self.attempts = 0;
        self.reconnect_at = None;
        self.offline.store(false, Ordering::SeqCst);
    }

    fn begin_open(&mut self) {
        self.set_state(ConnectionState::Connecting);

        let transport = Arc::clone(&self.transport);
        let url = self.config.url.clone();
        let timeout = self.config.connect_timeout;
        debug!("Opening channel to {}", url);

        self.pending_open = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, transport.open(&url)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(format!(
                    "no connection to {} within {:?}",
                    url, timeout
                ))),
            }
        }));
    }

    fn on_open_finished(&mut self, result: Result<Channel, TransportError>) {
        self.pending_open = None;

        let channel = match result {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Connection to {} failed: {}", self.config.url, e);
                self.set_state(ConnectionState::Disconnected);
                self.emit(ConnectionEvent::Disconnected {
                    reason: e.to_string(),
                });
                self.schedule_reconnect();
                return;
            }
        };

        info!("Connected to {}", self.config.url);
        self.channel = Some(channel);
        self.attempts = 0;
        self.offline.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
        self.emit(ConnectionEvent::Connected);

        for topic in self.subscriptions.clone() {
            if self
                .write(OutboundMessage::Subscribe { topic }.into_wire())
                .is_err()
            {
                self.on_channel_lost("write failed");
                return;
            }
        }

        if !self.outbox.is_empty() {
            debug!("Flushing {} queued messages", self.outbox.len());
        }
        while let Some(message) = self.outbox.pop_front() {
            if let Err(message) = self.write(message) {
                self.outbox.push_front(message);
                self.on_channel_lost("write failed");
                return;
            }
        }

        self.next_ping_at = Some(Instant::now() + self.config.ping_interval);
    }

    /// The open channel died: close, report and schedule a reconnect.
    fn on_channel_lost(&mut self, reason: &str) {
        info!("Connection lost: {}", reason);
        self.close_channel();
        self.set_state(ConnectionState::Disconnected);
        self.emit(ConnectionEvent::Disconnected {
            reason: reason.to_string(),
        });
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.attempts >= self.config.max_reconnect_attempts {
            error!(
                "Failed to reconnect after {} attempts, giving up",
                self.attempts
            );
            self.offline.store(true, Ordering::SeqCst);
            self.emit(ConnectionEvent::MaxReconnectAttemptsReached {
                attempts: self.attempts,
            });
            self.record(AnalyticsEvent::MaxReconnectAttemptsReached {
                attempts: self.attempts,
            });
            return;
        }

        self.attempts += 1;
        info!(
            "Reconnection attempt {} of {} in {:?}",
            self.attempts, self.config.max_reconnect_attempts, self.config.reconnect_interval
        );
        self.reconnect_at = Some(Instant::now() + self.config.reconnect_interval);
        self.set_state(ConnectionState::Reconnecting {
            attempt: self.attempts,
        });
    }

    fn disconnect(&mut self) {
        let was_connected = self.state().is_connected();
        self.close_channel();
        self.reconnect_at = None;
        self.attempts = 0;
        self.history.clear();
        self.offline.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
        if was_connected {
            self.emit(ConnectionEvent::Disconnected {
                reason: "disconnect requested".to_string(),
            });
        }
        info!("Disconnected");
    }

    /// Drop the channel and every per-channel timer.
    fn close_channel(&mut self) {
        self.pending_open = None;
        self.channel = None;
        self.next_ping_at = None;
        self.pong_deadline = None;
    }

    fn send(&mut self, message: WireMessage) {
        if self.state().is_connected() {
            match self.write(message) {
                Ok(()) => return,
                Err(message) => {
                    self.enqueue(message);
                    self.on_channel_lost("write failed");
                    return;
                }
            }
        }
        self.enqueue(message);
    }

    fn enqueue(&mut self, message: WireMessage) {
        self.outbox.push_back(message);
        while self.outbox.len() > self.config.max_queued_messages {
            if let Some(dropped) = self.outbox.pop_front() {
                warn!(
                    "Outbound queue full ({}), dropping oldest {} message",
                    self.config.max_queued_messages, dropped.message_type
                );
                self.emit(ConnectionEvent::MessageDropped(dropped));
            }
        }
    }

    /// Write one frame; hands the message back if the channel is gone.
    fn write(&mut self, message: WireMessage) -> Result<(), WireMessage> {
        let Some(channel) = &self.channel else {
            return Err(message);
        };
        let frame = match message.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize {} message: {}", message.message_type, e);
                return Ok(());
            }
        };
        debug!("Sending {}", message.message_type);
        channel.send(frame).map_err(|_| message)
    }

    /// Control frames are not queued; they are re-derived on the next connect.
    fn write_or_drop(&mut self, message: WireMessage) {
        if self.write(message).is_err() {
            self.on_channel_lost("write failed");
        }
    }

    fn send_ping(&mut self) {
        let now = Instant::now();
        self.next_ping_at = Some(now + self.config.ping_interval);
        if self.pong_deadline.is_none() {
            self.pong_deadline = Some(now + self.config.pong_timeout);
        }
        self.write_or_drop(OutboundMessage::Ping.into_wire());
    }

    fn on_frame(&mut self, frame: &str) {
        let message = match WireMessage::parse(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to parse inbound frame: {}", e);
                self.classify_malformed(e);
                return;
            }
        };

        if message.is_type(PONG) {
            debug!("Received pong");
            self.pong_deadline = None;
            return;
        }
        if message.is_type(PING) {
            self.write_or_drop(WireMessage::new(PONG, serde_json::Value::Null));
            return;
        }

        let typed = InboundMessage::from_wire(&message);
        self.emit(ConnectionEvent::Message(message));

        match typed {
            Ok(Some(typed)) => {
                self.history.push(&typed);
                self.emit(match typed {
                    InboundMessage::HealthMetricsUpdate(m) => ConnectionEvent::HealthMetricsUpdate(m),
                    InboundMessage::RealTimeAlert(a) => ConnectionEvent::RealTimeAlert(a),
                    InboundMessage::PredictionUpdate(p) => ConnectionEvent::PredictionUpdate(p),
                    InboundMessage::SystemStatus(s) => ConnectionEvent::SystemStatus(s),
                    InboundMessage::UserActivity(u) => ConnectionEvent::UserActivity(u),
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Invalid inbound payload: {}", e);
                self.classify_malformed(e);
            }
        }
    }

    fn classify_malformed(&self, error: serde_json::Error) {
        if let Some(classifier) = &self.classifier {
            classifier.classify(RawError::from(error), Some("inbound_message"));
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state() == state {
            return;
        }
        debug!("Connection state: {} -> {}", self.state(), state);
        self.state_tx.send_replace(state);
        self.emit(ConnectionEvent::StateChanged(state));
        self.record(AnalyticsEvent::ConnectionStateChanged(state));
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn record(&self, event: AnalyticsEvent) {
        if let Some(recorder) = self.classifier.as_ref().and_then(|c| c.recorder()) {
            recorder.record(&event);
        }
    }
}

async fn open_result(pending: &mut Option<PendingOpen>) -> Result<Channel, TransportError> {
    match pending.as_mut() {
        Some(open) => open.await,
        None => future::pending().await,
    }
}

async fn next_frame(channel: &mut Option<Channel>) -> Option<String> {
    match channel.as_mut() {
        Some(channel) => channel.inbound.recv().await,
        None => future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockTransport;
    use std::time::Duration;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("ws://test/realtime")
            .with_reconnect_interval(Duration::from_secs(5))
            .with_max_reconnect_attempts(3)
    }

    async fn wait_for(manager: &ConnectionManager, state: ConnectionState) {
        let mut rx = manager.state_receiver();
        rx.wait_for(|s| *s == state).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_noop_when_connected() {
        let transport = Arc::new(MockTransport::new());
        let manager = ConnectionManager::create(config(), transport.clone());

        manager.connect().unwrap();
        wait_for(&manager, ConnectionState::Connected).await;
        manager.connect().unwrap();
        manager.subscriptions().await.unwrap();

        assert_eq!(transport.open_count(), 1);
        manager.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_clears_history_and_stops_reconnect() {
        let transport = Arc::new(MockTransport::unreachable());
        let manager = ConnectionManager::create(config(), transport.clone());

        manager.connect().unwrap();
        wait_for(&manager, ConnectionState::Reconnecting { attempt: 1 }).await;
        manager.disconnect().await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.history(HistoryCategory::Metrics).await.unwrap().is_empty());
        manager.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbox_is_bounded() {
        let transport = Arc::new(MockTransport::new());
        let manager = ConnectionManager::create(
            config().with_max_queued_messages(2),
            transport,
        );
        let mut events = manager.events();

        for topic in ["a", "b", "c"] {
            manager
                .send(OutboundMessage::RequestRealTimeData {
                    metrics: vec![topic.to_string()],
                })
                .unwrap();
        }

        let queued = manager.queued_messages().await.unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].data["metrics"][0], "b");
        assert_eq!(queued[1].data["metrics"][0], "c");

        match events.recv().await.unwrap() {
            ConnectionEvent::MessageDropped(dropped) => assert_eq!(dropped.data["metrics"][0], "a"),
            other => panic!("unexpected event: {other:?}"),
        }
        manager.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriptions_are_deduplicated() {
        let manager = ConnectionManager::create(config(), Arc::new(MockTransport::new()));

        manager.subscribe("glucose").unwrap();
        manager.subscribe("glucose").unwrap();
        manager.subscribe("sleep").unwrap();
        manager.unsubscribe("glucose").unwrap();

        assert_eq!(manager.subscriptions().await.unwrap(), vec!["sleep".to_string()]);
        manager.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposed_handle_reports_error() {
        let manager = ConnectionManager::create(config(), Arc::new(MockTransport::new()));
        let commands = manager.commands.clone();
        manager.dispose().await;

        assert!(commands.send(Command::Connect).is_err());
    }
}
