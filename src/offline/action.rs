//! User-mutating actions captured while offline.
//!
//! [`ActionIntent`] is the typed payload; [`QueuedAction`] adds the stable
//! client id, creation time and attempt counter. On disk every action is an
//! [`ActionRecord`], `{ id, actionType, payload, createdAt, attempts }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ClassifiedError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealEntry {
    pub name: String,
    pub calories: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat_g: Option<f64>,
    pub eaten_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutEntry {
    pub activity: String,
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories_burned: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionGoals {
    pub daily_calories: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein_g: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs_g: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat_g: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_ml: Option<u32>,
}

/// A mutating user intent, tagged by action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ActionIntent {
    LogMeal(MealEntry),
    #[serde(rename_all = "camelCase")]
    DeleteMeal {
        meal_id: String,
    },
    LogWorkout(WorkoutEntry),
    LogWater {
        milliliters: u32,
    },
    UpdateGoals(NutritionGoals),
}

impl ActionIntent {
    pub fn action_type(&self) -> &'static str {
        match self {
            ActionIntent::LogMeal(_) => "log_meal",
            ActionIntent::DeleteMeal { .. } => "delete_meal",
            ActionIntent::LogWorkout(_) => "log_workout",
            ActionIntent::LogWater { .. } => "log_water",
            ActionIntent::UpdateGoals(_) => "update_goals",
        }
    }

    /// Rebuild an intent from its persisted type and payload.
    pub fn from_parts(action_type: &str, payload: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "type": action_type,
            "payload": payload,
        }))
    }

    /// The payload as stored and submitted.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

/// An action waiting in the offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ActionRecord", into = "ActionRecord")]
pub struct QueuedAction {
    /// Stable client-generated id; the idempotency key for replays
    pub id: String,
    pub intent: ActionIntent,
    pub created_at: DateTime<Utc>,
    /// Submissions attempted so far
    pub attempts: u32,
}

impl QueuedAction {
    pub fn new(intent: ActionIntent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            intent,
            created_at: Utc::now(),
            attempts: 0,
        }
    }

    pub fn action_type(&self) -> &'static str {
        self.intent.action_type()
    }
}

/// Persisted form of a [`QueuedAction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub id: String,
    pub action_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
}

impl From<QueuedAction> for ActionRecord {
    fn from(action: QueuedAction) -> Self {
        let action_type = action.intent.action_type().to_string();
        // Serializing plain data structs into a Value cannot fail.
        let payload = action.intent.payload().unwrap_or(Value::Null);
        Self {
            id: action.id,
            action_type,
            payload,
            created_at: action.created_at,
            attempts: action.attempts,
        }
    }
}

impl TryFrom<ActionRecord> for QueuedAction {
    type Error = serde_json::Error;

    fn try_from(record: ActionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            intent: ActionIntent::from_parts(&record.action_type, record.payload)?,
            id: record.id,
            created_at: record.created_at,
            attempts: record.attempts,
        })
    }
}

/// An action that failed replay terminally and needs user attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub action: QueuedAction,
    pub error_kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub user_message: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(action: QueuedAction, error: &ClassifiedError) -> Self {
        Self {
            action,
            error_kind: error.kind(),
            error_code: error.code().map(str::to_string),
            user_message: error.user_message().to_string(),
            failed_at: Utc::now(),
        }
    }
}
