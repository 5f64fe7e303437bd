//! Action submission trait abstraction.
//!
//! The offline queue replays actions through this seam, which is the same
//! API-client path used for online writes.

use async_trait::async_trait;

use crate::error::RawError;
use crate::offline::QueuedAction;

/// Trait for submitting a queued user action to the backend.
///
/// Implementations must forward `action.id` so the receiving endpoint can
/// deduplicate replays of the same action.
#[async_trait]
pub trait ActionSubmitter: Send + Sync {
    /// Submit one action.
    ///
    /// # Returns
    /// Ok(()) once the backend confirmed the write, or the raw failure
    async fn submit(&self, action: &QueuedAction) -> Result<(), RawError>;
}
