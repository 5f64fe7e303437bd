//! Wire format of the real-time channel.
//!
//! Every frame in both directions is a JSON envelope
//! `{ "type": string, "data": any, "timestamp": number }`. The envelope is
//! [`WireMessage`]; [`InboundMessage`] and [`OutboundMessage`] are the typed
//! views, validated when converting from or into the envelope.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const SUBSCRIBE: &str = "subscribe";
pub const UNSUBSCRIBE: &str = "unsubscribe";
pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const REQUEST_REAL_TIME_DATA: &str = "request_real_time_data";
pub const USER_ACTION: &str = "user_action";

pub const HEALTH_METRICS_UPDATE: &str = "health_metrics_update";
pub const REAL_TIME_ALERT: &str = "real_time_alert";
pub const PREDICTION_UPDATE: &str = "prediction_update";
pub const SYSTEM_STATUS: &str = "system_status";
pub const USER_ACTIVITY: &str = "user_activity";

/// Wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub data: Value,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: i64,
}

impl WireMessage {
    /// New envelope stamped with the current time.
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn is_type(&self, message_type: &str) -> bool {
        self.message_type == message_type
    }
}

/// A health metric reading pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetric {
    pub metric: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// A real-time alert (e.g. glucose out of range).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub level: AlertLevel,
    pub message: String,
}

/// Output of a server-side prediction model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub model: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub user_id: String,
    pub activity: String,
}

/// Typed server-to-client application messages.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    HealthMetricsUpdate(HealthMetric),
    RealTimeAlert(Alert),
    PredictionUpdate(Prediction),
    SystemStatus(SystemStatus),
    UserActivity(UserActivity),
}

impl InboundMessage {
    /// Validate the payload of an application message.
    ///
    /// # Returns
    /// - `Ok(Some(_))` for a known type with a valid payload
    /// - `Ok(None)` for types without a typed view (control or unknown)
    /// - `Err(_)` when a known type carries a malformed payload
    pub fn from_wire(message: &WireMessage) -> Result<Option<Self>, serde_json::Error> {
        let data = || message.data.clone();
        let typed = match message.message_type.as_str() {
            HEALTH_METRICS_UPDATE => InboundMessage::HealthMetricsUpdate(serde_json::from_value(data())?),
            REAL_TIME_ALERT => InboundMessage::RealTimeAlert(serde_json::from_value(data())?),
            PREDICTION_UPDATE => InboundMessage::PredictionUpdate(serde_json::from_value(data())?),
            SYSTEM_STATUS => InboundMessage::SystemStatus(serde_json::from_value(data())?),
            USER_ACTIVITY => InboundMessage::UserActivity(serde_json::from_value(data())?),
            _ => return Ok(None),
        };
        Ok(Some(typed))
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            InboundMessage::HealthMetricsUpdate(_) => HEALTH_METRICS_UPDATE,
            InboundMessage::RealTimeAlert(_) => REAL_TIME_ALERT,
            InboundMessage::PredictionUpdate(_) => PREDICTION_UPDATE,
            InboundMessage::SystemStatus(_) => SYSTEM_STATUS,
            InboundMessage::UserActivity(_) => USER_ACTIVITY,
        }
    }
}

/// Client-to-server messages.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Ping,
    RequestRealTimeData { metrics: Vec<String> },
    UserAction { action: String, payload: Value },
}

impl OutboundMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            OutboundMessage::Subscribe { .. } => SUBSCRIBE,
            OutboundMessage::Unsubscribe { .. } => UNSUBSCRIBE,
            OutboundMessage::Ping => PING,
            OutboundMessage::RequestRealTimeData { .. } => REQUEST_REAL_TIME_DATA,
            OutboundMessage::UserAction { .. } => USER_ACTION,
        }
    }

    pub fn into_wire(self) -> WireMessage {
        let message_type = self.message_type();
        let data = match self {
            OutboundMessage::Subscribe { topic } | OutboundMessage::Unsubscribe { topic } => {
                json!({ "topic": topic })
            }
            OutboundMessage::Ping => Value::Null,
            OutboundMessage::RequestRealTimeData { metrics } => json!({ "metrics": metrics }),
            OutboundMessage::UserAction { action, payload } => {
                json!({ "action": action, "payload": payload })
            }
        };
        WireMessage::new(message_type, data)
    }
}
