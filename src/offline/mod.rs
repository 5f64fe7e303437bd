//! Offline action queue.
//!
//! User writes made without connectivity are captured as [`QueuedAction`]s,
//! persisted immediately and replayed in order once the connection returns.

pub mod action;
pub mod queue;
pub mod replay;

pub use action::{
    ActionIntent, ActionRecord, DeadLetter, MealEntry, NutritionGoals, QueuedAction, WorkoutEntry,
};
pub use queue::{FlushReport, OfflineActionQueue, QueueEvent};
pub use replay::spawn_replay_on_reconnect;
