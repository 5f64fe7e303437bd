use super::messages::{Alert, HealthMetric, Prediction, SystemStatus, UserActivity, WireMessage};
use super::state::ConnectionState;

/// Events published by the connection manager.
///
/// Every inbound application frame is published twice: once as the generic
/// [`Message`](ConnectionEvent::Message) and once as its typed variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// The channel is open and subscriptions were re-issued.
    Connected,
    Disconnected { reason: String },
    Message(WireMessage),
    HealthMetricsUpdate(HealthMetric),
    RealTimeAlert(Alert),
    PredictionUpdate(Prediction),
    SystemStatus(SystemStatus),
    UserActivity(UserActivity),
    /// The outbound queue overflowed and its oldest entry was dropped.
    MessageDropped(WireMessage),
    /// Automatic reconnection stopped. Emitted once per reconnect cycle.
    MaxReconnectAttemptsReached { attempts: u32 },
}
