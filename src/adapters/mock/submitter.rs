//! Mock action submitter for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RawError;
use crate::offline::QueuedAction;
use crate::traits::ActionSubmitter;

#[derive(Debug, Default)]
struct Script {
    /// One-shot failures per action id, consumed in order
    next: HashMap<String, VecDeque<RawError>>,
    /// Failures returned on every submission of an action id
    always: HashMap<String, RawError>,
    submitted: Vec<String>,
}

/// Submitter that records submissions and fails on request.
///
/// Unscripted submissions succeed.
#[derive(Debug, Default)]
pub struct MockActionSubmitter {
    script: Mutex<Script>,
    delay: Duration,
}

impl MockActionSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every submission by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next submission of `id` with `error`.
    pub fn fail_next(&self, id: &str, error: RawError) {
        self.lock()
            .next
            .entry(id.to_string())
            .or_default()
            .push_back(error);
    }

    /// Fail every submission of `id` with `error`.
    pub fn fail_always(&self, id: &str, error: RawError) {
        self.lock().always.insert(id.to_string(), error);
    }

    /// Ids of all submissions, in submission order (repeats included).
    pub fn submitted_ids(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ActionSubmitter for MockActionSubmitter {
    async fn submit(&self, action: &QueuedAction) -> Result<(), RawError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut script = self.lock();
        script.submitted.push(action.id.clone());

        if let Some(error) = script.always.get(&action.id) {
            return Err(error.clone());
        }
        match script.next.get_mut(&action.id).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
