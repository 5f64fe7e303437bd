//! Recovery engine.
//!
//! Given a [`ClassifiedError`] and the operation that produced it, the engine
//! applies the error's [`RecoveryStrategy`]: re-invoke with linear backoff,
//! refresh the access token and re-issue once, or clear the session and hand
//! the error back.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::analytics::{AnalyticsEvent, RecoveryOutcome};
use super::category::{ErrorKind, RecoveryStrategy};
use super::classified::ClassifiedError;
use super::classifier::ErrorClassifier;
use super::raw::RawError;
use crate::config::RecoveryConfig;
use crate::traits::SessionManager;

type SharedRefresh = Shared<BoxFuture<'static, Result<(), RawError>>>;

/// Applies recovery strategies to classified errors.
///
/// The engine is shared (`Arc`) between every caller of the API client. Only
/// one token refresh runs at a time; concurrent callers that need a refresh
/// await the one already in flight.
pub struct RecoveryEngine {
    config: RecoveryConfig,
    classifier: Arc<ErrorClassifier>,
    session: Arc<dyn SessionManager>,
    refresh: Mutex<Option<(u64, SharedRefresh)>>,
    refresh_generation: AtomicU64,
    attempts: Mutex<HashMap<ErrorKind, u32>>,
}

impl RecoveryEngine {
    pub fn new(
        config: RecoveryConfig,
        classifier: Arc<ErrorClassifier>,
        session: Arc<dyn SessionManager>,
    ) -> Self {
        Self {
            config,
            classifier,
            session,
            refresh: Mutex::new(None),
            refresh_generation: AtomicU64::new(0),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Arc<ErrorClassifier> {
        &self.classifier
    }

    /// Total automatic re-invocations performed for errors of `kind`.
    pub fn retry_attempts(&self, kind: ErrorKind) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    /// Invoke `operation` once and route a failure through classification
    /// and [`handle`](Self::handle).
    pub async fn run<T, E, F, Fut>(
        &self,
        mut operation: F,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawError>,
    {
        match operation().await {
            Ok(value) => Ok(value),
            Err(raw) => {
                let error = self.classifier.classify(raw, context);
                self.handle(error, operation, cancel).await
            }
        }
    }

    /// Attempt to recover from `error`, which was produced by `operation`.
    ///
    /// # Returns
    /// - `Ok(value)`: recovered; `value` is the result of a successful
    ///   re-invocation
    /// - `Err(error)`: terminal; surface `error.user_message()` to the user
    pub async fn handle<T, E, F, Fut>(
        &self,
        error: ClassifiedError,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawError>,
    {
        let kind = error.kind();

        let (result, outcome) = match error.recovery() {
            RecoveryStrategy::ReLogin => {
                info!("{} error requires re-authentication, clearing session", kind);
                self.session.clear_session().await;
                (Err(error), RecoveryOutcome::Terminal)
            }
            RecoveryStrategy::Retry if error.is_retryable() => {
                self.retry(error, &mut operation, cancel).await
            }
            RecoveryStrategy::RefreshToken if error.is_retryable() => {
                self.refresh_and_reissue(error, &mut operation, cancel).await
            }
            _ => return Err(error),
        };

        if let Some(recorder) = self.classifier.recorder() {
            recorder.record(&AnalyticsEvent::RecoveryFinished { kind, outcome });
        }
        result
    }

    async fn retry<T, E, F, Fut>(
        &self,
        mut error: ClassifiedError,
        operation: &mut F,
        cancel: &CancellationToken,
    ) -> (Result<T, ClassifiedError>, RecoveryOutcome)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawError>,
    {
        let context = error.context().map(str::to_string);
        let mut attempts = 0;

        while error.retry_count() < self.config.max_retries {
            let delay = self.config.backoff_delay(error.retry_count());
            debug!(
                "Retrying {} error in {:?} (attempt {}/{})",
                error.kind(),
                delay,
                error.retry_count() + 1,
                self.config.max_retries
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Retry of {} error cancelled", error.kind());
                    return (Err(self.terminal(error)), RecoveryOutcome::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempts += 1;
            self.count_attempt(error.kind());

            match operation().await {
                Ok(value) => {
                    info!(
                        "Recovered from {} error after {} retries",
                        error.kind(),
                        attempts
                    );
                    return (Ok(value), RecoveryOutcome::Recovered { attempts });
                }
                Err(raw) => {
                    let next = self
                        .classifier
                        .classify(raw, context.as_deref())
                        .with_retry_count(error.retry_count() + 1);

                    if next.recovery() != RecoveryStrategy::Retry || !next.is_retryable() {
                        debug!("Retry produced a {} error, giving up", next.kind());
                        return (Err(next), RecoveryOutcome::Terminal);
                    }
                    error = next;
                }
            }
        }

        warn!(
            "Giving up on {} error after {} retries",
            error.kind(),
            error.retry_count()
        );
        (Err(self.terminal(error)), RecoveryOutcome::Exhausted { attempts })
    }

    async fn refresh_and_reissue<T, E, F, Fut>(
        &self,
        error: ClassifiedError,
        operation: &mut F,
        cancel: &CancellationToken,
    ) -> (Result<T, ClassifiedError>, RecoveryOutcome)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawError>,
    {
        let refreshed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return (Err(self.terminal(error)), RecoveryOutcome::Cancelled);
            }
            result = self.shared_refresh() => result,
        };

        if let Err(raw) = refreshed {
            warn!("Token refresh failed: {}. Forcing re-login", raw);
            self.session.clear_session().await;
            let escalated = error.escalate_to_relogin();
            self.classifier.track(&escalated);
            return (Err(escalated), RecoveryOutcome::Escalated);
        }

        // Re-issued exactly once; a second expiry goes back to the caller.
        self.count_attempt(error.kind());
        match operation().await {
            Ok(value) => (Ok(value), RecoveryOutcome::Recovered { attempts: 1 }),
            Err(raw) => {
                let next = self
                    .classifier
                    .classify(raw, error.context())
                    .with_retry_count(error.retry_count() + 1);
                (Err(next), RecoveryOutcome::Terminal)
            }
        }
    }

    /// Join the in-flight refresh or start a new one.
    async fn shared_refresh(&self) -> Result<(), RawError> {
        let (generation, refresh) = {
            let mut slot = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some((generation, refresh)) => {
                    debug!("Joining in-flight token refresh");
                    (*generation, refresh.clone())
                }
                None => {
                    let generation = self.refresh_generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let session = Arc::clone(&self.session);
                    let timeout = self.config.refresh_timeout;
                    let refresh = async move {
                        match tokio::time::timeout(timeout, session.refresh_token()).await {
                            Ok(result) => result,
                            Err(_) => Err(RawError::NoResponse {
                                message: format!("token refresh timed out after {:?}", timeout),
                            }),
                        }
                    }
                    .boxed()
                    .shared();
                    *slot = Some((generation, refresh.clone()));
                    (generation, refresh)
                }
            }
        };

        let result = refresh.await;

        let mut slot = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|(current, _)| *current == generation) {
            *slot = None;
        }
        result
    }

    fn terminal(&self, error: ClassifiedError) -> ClassifiedError {
        let terminal = error.into_terminal();
        self.classifier.track(&terminal);
        terminal
    }

    fn count_attempt(&self, kind: ErrorKind) {
        *self
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_insert(0) += 1;
    }
}

impl std::fmt::Debug for RecoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryEngine")
            .field("config", &self.config)
            .field("classifier", &self.classifier)
            .finish()
    }
}
