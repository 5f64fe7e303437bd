//! Mock session manager for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RawError;
use crate::traits::SessionManager;

/// Session manager with a scripted refresh result.
///
/// # Example
///
/// ```ignore
/// use nutrilink::adapters::mock::MockSession;
///
/// let session = MockSession::new().with_refresh_delay(Duration::from_millis(200));
/// // ... drive the recovery engine ...
/// assert_eq!(session.refresh_calls(), 1);
/// ```
#[derive(Debug)]
pub struct MockSession {
    refresh_result: Mutex<Result<(), RawError>>,
    refresh_delay: Mutex<Duration>,
    refresh_calls: AtomicUsize,
    clear_calls: AtomicUsize,
}

impl MockSession {
    /// Session whose refreshes succeed immediately.
    pub fn new() -> Self {
        Self {
            refresh_result: Mutex::new(Ok(())),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_refresh_result(self, result: Result<(), RawError>) -> Self {
        self.set_refresh_result(result);
        self
    }

    pub fn with_refresh_delay(self, delay: Duration) -> Self {
        *self
            .refresh_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
        self
    }

    pub fn set_refresh_result(&self, result: Result<(), RawError>) {
        *self
            .refresh_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = result;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionManager for MockSession {
    async fn refresh_token(&self) -> Result<(), RawError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self
            .refresh_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.refresh_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn clear_session(&self) {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
    }
}
