//! Real-time connection management.
//!
//! [`ConnectionManager`] keeps one bidirectional channel to the backend alive
//! across flaky networks: it reconnects on a fixed interval, re-issues topic
//! subscriptions, queues outbound messages while disconnected and probes
//! liveness with ping/pong.

pub mod events;
pub mod history;
pub mod manager;
pub mod messages;
pub mod state;

pub use events::ConnectionEvent;
pub use history::{HistoryCategory, RollingHistory};
pub use manager::{ConnectionError, ConnectionManager};
pub use messages::{
    Alert, AlertLevel, HealthMetric, InboundMessage, OutboundMessage, Prediction, SystemStatus,
    UserActivity, WireMessage,
};
pub use state::ConnectionState;
