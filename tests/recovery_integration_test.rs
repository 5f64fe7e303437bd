//! End-to-end tests for classification plus automatic recovery.

mod common;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use common::{fast_recovery, test_engine};
use nutrilink::adapters::mock::MockSession;
use nutrilink::error::{
    AnalyticsEvent, ClassifiedError, ErrorKind, RawError, RecoveryOutcome, RecoveryStrategy,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_server_error_gives_up_after_max_retries() {
    let t = test_engine(fast_recovery(2), MockSession::new());
    let cancel = CancellationToken::new();
    let calls = AtomicU32::new(0);

    let result: Result<(), ClassifiedError> = t
        .engine
        .run(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RawError::status(500)) }
            },
            Some("log_meal"),
            &cancel,
        )
        .await;

    let err = result.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.kind(), ErrorKind::ServerError);
    assert_eq!(err.retry_count(), 2);
    assert_eq!(err.context(), Some("log_meal"));
    assert!(err.is_terminal());
    assert_eq!(err.user_message(), ErrorKind::ServerError.user_message());
    assert_eq!(t.engine.retry_attempts(ErrorKind::ServerError), 2);

    assert_eq!(
        t.recorder.count(|e| matches!(
            e,
            AnalyticsEvent::RecoveryFinished {
                kind: ErrorKind::ServerError,
                outcome: RecoveryOutcome::Exhausted { attempts: 2 },
            }
        )),
        1
    );
    assert!(t.classifier.analytics().frequency(ErrorKind::ServerError) >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_error_recovers_on_third_call() {
    let t = test_engine(fast_recovery(2), MockSession::new());
    let cancel = CancellationToken::new();
    let calls = AtomicU32::new(0);

    let raw = RawError::from_value(json!({ "response": { "status": 500 } }));
    let first = t.classifier.classify(raw, Some("sync_diary"));
    assert_eq!(first.kind(), ErrorKind::ServerError);
    assert!(first.is_retryable());
    assert_eq!(first.recovery(), RecoveryStrategy::Retry);

    let result = t
        .engine
        .handle(
            first,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 2 {
                        Err(RawError::status(500))
                    } else {
                        Ok(())
                    }
                }
            },
            &cancel,
        )
        .await;

    // The failing call that produced `first` plus two re-invocations.
    assert!(result.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst) + 1, 3);
    assert_eq!(t.engine.retry_attempts(ErrorKind::ServerError), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_expiries_share_one_refresh() {
    let session = MockSession::new().with_refresh_delay(Duration::from_millis(200));
    let t = test_engine(fast_recovery(3), session);
    let cancel = CancellationToken::new();

    let first_a = AtomicBool::new(true);
    let first_b = AtomicBool::new(true);
    let expiring = |first: &AtomicBool, value: u32| {
        let expired = first.swap(false, Ordering::SeqCst);
        async move {
            if expired {
                Err(RawError::TokenExpired {
                    message: "jwt expired".to_string(),
                })
            } else {
                Ok(value)
            }
        }
    };

    let (a, b) = tokio::join!(
        t.engine.run(|| expiring(&first_a, 1), Some("a"), &cancel),
        t.engine.run(|| expiring(&first_b, 2), Some("b"), &cancel),
    );

    assert_eq!(a.unwrap(), 1);
    assert_eq!(b.unwrap(), 2);
    assert_eq!(t.session.refresh_calls(), 1);
    assert_eq!(t.session.clear_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_clears_session_and_requires_login() {
    let session = MockSession::new().with_refresh_result(Err(RawError::status(401)));
    let t = test_engine(fast_recovery(3), session);
    let cancel = CancellationToken::new();
    let calls = AtomicU32::new(0);

    let result: Result<(), ClassifiedError> = t
        .engine
        .run(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(RawError::TokenExpired {
                        message: "token expired".to_string(),
                    })
                }
            },
            None,
            &cancel,
        )
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.recovery(), RecoveryStrategy::ReLogin);
    assert!(!err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(t.session.clear_calls(), 1);
    assert_eq!(
        t.recorder.count(|e| matches!(
            e,
            AnalyticsEvent::RecoveryFinished {
                outcome: RecoveryOutcome::Escalated,
                ..
            }
        )),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_stops_retrying() {
    let t = test_engine(
        fast_recovery(5).with_retry_delay(Duration::from_secs(1)),
        MockSession::new(),
    );
    let cancel = CancellationToken::new();
    let calls = AtomicU32::new(0);

    let run = t.engine.run(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RawError::Offline) }
        },
        None,
        &cancel,
    );
    let trigger = async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(run, trigger);

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        t.recorder.count(|e| matches!(
            e,
            AnalyticsEvent::RecoveryFinished {
                outcome: RecoveryOutcome::Cancelled,
                ..
            }
        )),
        1
    );
}

#[tokio::test]
async fn test_validation_error_is_returned_untouched() {
    let t = test_engine(fast_recovery(3), MockSession::new());
    let cancel = CancellationToken::new();
    let calls = AtomicU32::new(0);

    let result: Result<(), ClassifiedError> = t
        .engine
        .run(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(RawError::Http {
                        status: 422,
                        message: Some("calories must be positive".to_string()),
                        code: Some("INVALID_CALORIES".to_string()),
                    })
                }
            },
            Some("log_meal"),
            &cancel,
        )
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.code(), Some("INVALID_CALORIES"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        t.recorder
            .count(|e| matches!(e, AnalyticsEvent::RecoveryFinished { .. })),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn test_offline_flag_turns_failures_into_network_errors() {
    let t = test_engine(fast_recovery(1), MockSession::new());
    t.classifier.set_online(false);

    let err = t.classifier.classify(RawError::status(404), Some("load_diary"));
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(err.is_retryable());

    t.classifier.set_online(true);
    let err = t.classifier.classify(RawError::status(404), Some("load_diary"));
    assert_eq!(err.kind(), ErrorKind::Validation);
}
