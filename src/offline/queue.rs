//! Durable FIFO of offline actions.
//!
//! Every mutation is persisted before the in-memory queue changes, so a crash
//! at any point leaves the store holding either the old or the new queue and
//! never loses an enqueued action.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::action::{ActionIntent, DeadLetter, QueuedAction};
use crate::config::QueueConfig;
use crate::error::{ClassifiedError, ErrorKind, RecoveryEngine};
use crate::traits::{ActionSubmitter, KeyValueStore, StorageError};

const EVENT_CAPACITY: usize = 64;

/// Events raised by the queue for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Enqueued { id: String },
    Replayed { id: String },
    DeadLettered { id: String, kind: ErrorKind },
    /// A dead-lettered action needs the user's attention.
    RecoveryNeeded {
        action: QueuedAction,
        error: ClassifiedError,
    },
    /// Replay stopped at `id`; it stays at the head of the queue.
    FlushHalted { id: String, error: ClassifiedError },
}

/// Result of one [`OfflineActionQueue::flush`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    pub replayed: Vec<String>,
    pub dead_lettered: Vec<String>,
    /// Why replay stopped early, if it did
    pub halted: Option<ClassifiedError>,
    /// Another flush was already running
    pub skipped: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<QueuedAction>,
    dead_letters: Vec<DeadLetter>,
}

/// Persistent offline action queue.
///
/// # Example
///
/// ```ignore
/// use nutrilink::offline::{ActionIntent, OfflineActionQueue};
///
/// let queue = OfflineActionQueue::load(store, QueueConfig::default()).await?;
/// queue.enqueue(ActionIntent::LogWater { milliliters: 250 }).await?;
///
/// // later, once connectivity is back
/// let report = queue.flush(&*submitter, &engine, &cancel).await?;
/// ```
pub struct OfflineActionQueue {
    store: Arc<dyn KeyValueStore>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    flushing: AtomicBool,
    events: broadcast::Sender<QueueEvent>,
}

impl OfflineActionQueue {
    /// Restore the queue and its dead-letter list from `store`.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        config: QueueConfig,
    ) -> Result<Self, StorageError> {
        let pending: Vec<QueuedAction> = load_json(&*store, &config.pending_key()).await?;
        let dead_letters: Vec<DeadLetter> = load_json(&*store, &config.dead_letter_key()).await?;

        if !pending.is_empty() || !dead_letters.is_empty() {
            info!(
                "Restored offline queue: {} pending, {} dead-lettered",
                pending.len(),
                dead_letters.len()
            );
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            store,
            config,
            state: Mutex::new(QueueState {
                pending: pending.into(),
                dead_letters,
            }),
            flushing: AtomicBool::new(false),
            events,
        })
    }

    pub fn events(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Append an action with a fresh id. Durable once this returns `Ok`.
    pub async fn enqueue(&self, intent: ActionIntent) -> Result<QueuedAction, StorageError> {
        let action = QueuedAction::new(intent);
        let mut state = self.state.lock().await;

        let mut next = state.pending.clone();
        next.push_back(action.clone());
        self.persist_pending(&next).await?;
        state.pending = next;

        debug!("Queued {} action {}", action.action_type(), action.id);
        self.emit(QueueEvent::Enqueued {
            id: action.id.clone(),
        });
        Ok(action)
    }

    /// Number of pending actions.
    pub async fn size(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    /// Pending actions, oldest first.
    pub async fn pending(&self) -> Vec<QueuedAction> {
        self.state.lock().await.pending.iter().cloned().collect()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.clone()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::SeqCst)
    }

    /// Replay pending actions in order through `submitter`.
    ///
    /// Each action goes through `engine`, so transient failures are retried
    /// before the queue gives up on it. Actions rejected for action-specific
    /// reasons are dead-lettered and replay continues; failures that would
    /// hit every later action as well halt replay with the failing action
    /// still at the head.
    pub async fn flush(
        &self,
        submitter: &dyn ActionSubmitter,
        engine: &RecoveryEngine,
        cancel: &CancellationToken,
    ) -> Result<FlushReport, StorageError> {
        let Some(_guard) = FlushGuard::acquire(&self.flushing) else {
            debug!("Flush already in progress, skipping");
            return Ok(FlushReport {
                skipped: true,
                ..FlushReport::default()
            });
        };

        let mut report = FlushReport::default();

        loop {
            if cancel.is_cancelled() {
                debug!("Flush cancelled");
                break;
            }

            let Some(action) = self.state.lock().await.pending.front().cloned() else {
                break;
            };

            let submissions = AtomicU32::new(0);
            let counter = &submissions;
            let action_ref = &action;
            let result = engine
                .run(
                    move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        submitter.submit(action_ref)
                    },
                    Some(action.action_type()),
                    cancel,
                )
                .await;

            let mut attempted = action;
            attempted.attempts += submissions.load(Ordering::SeqCst);

            match result {
                Ok(()) => {
                    self.remove_head(&attempted.id).await?;
                    info!("Replayed {} action {}", attempted.action_type(), attempted.id);
                    self.emit(QueueEvent::Replayed {
                        id: attempted.id.clone(),
                    });
                    report.replayed.push(attempted.id);
                }
                Err(error) if blocks_replay(error.kind()) => {
                    self.update_head(&attempted).await?;
                    warn!(
                        "Replay halted at {} action {}: {}",
                        attempted.action_type(),
                        attempted.id,
                        error
                    );
                    self.emit(QueueEvent::FlushHalted {
                        id: attempted.id,
                        error: error.clone(),
                    });
                    report.halted = Some(error);
                    break;
                }
                Err(error) => {
                    self.dead_letter_head(attempted.clone(), &error).await?;
                    warn!(
                        "Dead-lettered {} action {}: {}",
                        attempted.action_type(),
                        attempted.id,
                        error
                    );
                    self.emit(QueueEvent::DeadLettered {
                        id: attempted.id.clone(),
                        kind: error.kind(),
                    });
                    report.dead_lettered.push(attempted.id.clone());
                    self.emit(QueueEvent::RecoveryNeeded {
                        action: attempted,
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Move a dead-lettered action back to the tail of the queue.
    ///
    /// # Returns
    /// `Ok(false)` if no dead letter has this id
    pub async fn requeue_dead_letter(&self, id: &str) -> Result<bool, StorageError> {
        let mut state = self.state.lock().await;
        let Some(index) = state.dead_letters.iter().position(|d| d.action.id == id) else {
            return Ok(false);
        };

        let mut dead_letters = state.dead_letters.clone();
        let letter = dead_letters.remove(index);
        let mut pending = state.pending.clone();
        pending.push_back(letter.action);

        // Pending first: a crash in between leaves a duplicate, never a loss.
        self.persist_pending(&pending).await?;
        self.persist_dead_letters(&dead_letters).await?;
        state.pending = pending;
        state.dead_letters = dead_letters;

        info!("Requeued dead-lettered action {}", id);
        Ok(true)
    }

    /// Drop a dead-lettered action for good.
    pub async fn discard_dead_letter(&self, id: &str) -> Result<bool, StorageError> {
        let mut state = self.state.lock().await;
        let before = state.dead_letters.len();
        let dead_letters: Vec<DeadLetter> = state
            .dead_letters
            .iter()
            .filter(|d| d.action.id != id)
            .cloned()
            .collect();
        if dead_letters.len() == before {
            return Ok(false);
        }

        self.persist_dead_letters(&dead_letters).await?;
        state.dead_letters = dead_letters;
        Ok(true)
    }

    async fn remove_head(&self, id: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let mut next = state.pending.clone();
        if next.front().is_some_and(|a| a.id == id) {
            next.pop_front();
        }
        self.persist_pending(&next).await?;
        state.pending = next;
        Ok(())
    }

    async fn update_head(&self, action: &QueuedAction) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let mut next = state.pending.clone();
        match next.front_mut() {
            Some(head) if head.id == action.id => head.attempts = action.attempts,
            _ => return Ok(()),
        }
        self.persist_pending(&next).await?;
        state.pending = next;
        Ok(())
    }

    async fn dead_letter_head(
        &self,
        action: QueuedAction,
        error: &ClassifiedError,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let mut pending = state.pending.clone();
        if pending.front().is_some_and(|a| a.id == action.id) {
            pending.pop_front();
        }
        let mut dead_letters = state.dead_letters.clone();
        dead_letters.push(DeadLetter::new(action, error));

        // Dead letter first: a crash in between leaves a duplicate, never a loss.
        self.persist_dead_letters(&dead_letters).await?;
        self.persist_pending(&pending).await?;
        state.pending = pending;
        state.dead_letters = dead_letters;
        Ok(())
    }

    async fn persist_pending(&self, pending: &VecDeque<QueuedAction>) -> Result<(), StorageError> {
        save_json(&*self.store, &self.config.pending_key(), pending).await
    }

    async fn persist_dead_letters(&self, dead_letters: &[DeadLetter]) -> Result<(), StorageError> {
        save_json(&*self.store, &self.config.dead_letter_key(), dead_letters).await
    }

    fn emit(&self, event: QueueEvent) {
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for OfflineActionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineActionQueue")
            .field("config", &self.config)
            .field("flushing", &self.is_flushing())
            .finish()
    }
}

/// Kinds that would fail every later action too, so replay stops instead of
/// dead-lettering.
fn blocks_replay(kind: ErrorKind) -> bool {
    kind.is_transient() || matches!(kind, ErrorKind::Authentication | ErrorKind::RateLimited)
}

struct FlushGuard<'a>(&'a AtomicBool);

impl<'a> FlushGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn load_json<T>(store: &dyn KeyValueStore, key: &str) -> Result<Vec<T>, StorageError>
where
    T: serde::de::DeserializeOwned,
{
    match store.load(key).await? {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(&raw).map_err(|e| {
            error!("Corrupt offline queue data under '{}': {}", key, e);
            StorageError::Serialization {
                key: key.to_string(),
                message: e.to_string(),
            }
        }),
    }
}

async fn save_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value).map_err(|e| StorageError::Serialization {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.save(key, &raw).await
}
