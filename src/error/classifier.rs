//! Classification of raw failures.
//!
//! [`classify_raw`] holds the mapping rules as a pure function. The
//! [`ErrorClassifier`] wraps it with the bits of ambient state the rules and
//! the analytics need: the reachability flag, the current user identity and
//! the recorders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::analytics::{AnalyticsEvent, AnalyticsRecorder, ErrorAnalytics};
use super::category::{ErrorKind, RecoveryStrategy, Severity};
use super::classified::ClassifiedError;
use super::raw::RawError;

/// Apply the classification rules to a raw error.
///
/// Rules are checked in priority order and the first match wins:
/// malformed payload, no connectivity, HTTP status, token expiry, default.
pub fn classify_raw(raw: &RawError, online: bool) -> ClassifiedError {
    let message = raw.technical_message();

    if let RawError::Parse { message: parse_message } = raw {
        if references_wire_format(parse_message) {
            return ClassifiedError::new(
                ErrorKind::MalformedResponse,
                Severity::Medium,
                RecoveryStrategy::None,
                false,
                message,
            );
        }
    }

    if !online || matches!(raw, RawError::Offline | RawError::NoResponse { .. }) {
        return ClassifiedError::new(
            ErrorKind::Network,
            Severity::Low,
            RecoveryStrategy::Retry,
            true,
            message,
        );
    }

    if let RawError::Http { status, code, .. } = raw {
        let code = code.clone().or_else(|| Some(format!("HTTP_{}", status)));
        let classified = match *status {
            401 => Some(ClassifiedError::new(
                ErrorKind::Authentication,
                Severity::Medium,
                RecoveryStrategy::ReLogin,
                false,
                message.clone(),
            )),
            403 => Some(ClassifiedError::new(
                ErrorKind::PermissionDenied,
                Severity::High,
                RecoveryStrategy::ReLogin,
                false,
                message.clone(),
            )),
            429 => Some(ClassifiedError::new(
                ErrorKind::RateLimited,
                Severity::Medium,
                RecoveryStrategy::None,
                false,
                message.clone(),
            )),
            500..=599 => Some(ClassifiedError::new(
                ErrorKind::ServerError,
                Severity::Medium,
                RecoveryStrategy::Retry,
                true,
                message.clone(),
            )),
            400..=499 => Some(ClassifiedError::new(
                ErrorKind::Validation,
                Severity::Medium,
                RecoveryStrategy::None,
                false,
                message.clone(),
            )),
            _ => None,
        };

        if let Some(classified) = classified {
            return classified.with_code(code);
        }
    }

    if signals_token_expiry(raw) {
        return ClassifiedError::new(
            ErrorKind::Authentication,
            Severity::Medium,
            RecoveryStrategy::RefreshToken,
            true,
            message,
        );
    }

    ClassifiedError::new(
        ErrorKind::Unknown,
        Severity::Medium,
        RecoveryStrategy::None,
        false,
        message,
    )
}

fn references_wire_format(message: &str) -> bool {
    message.to_ascii_lowercase().contains("json")
}

fn signals_token_expiry(raw: &RawError) -> bool {
    match raw {
        RawError::TokenExpired { .. } => true,
        RawError::Message(message)
        | RawError::Http {
            message: Some(message),
            ..
        } => {
            let lower = message.to_ascii_lowercase();
            lower.contains("token expired")
                || lower.contains("token has expired")
                || lower.contains("jwt expired")
        }
        _ => false,
    }
}

/// Classifies raw failures and records them.
///
/// # Example
///
/// ```ignore
/// use nutrilink::error::{ErrorClassifier, RawError};
///
/// let classifier = ErrorClassifier::new();
/// let err = classifier.classify(RawError::status(503), Some("log_meal"));
/// assert!(err.is_retryable());
/// ```
pub struct ErrorClassifier {
    analytics: Arc<ErrorAnalytics>,
    recorder: Option<Arc<dyn AnalyticsRecorder>>,
    online: AtomicBool,
    identity: RwLock<Option<String>>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self {
            analytics: Arc::new(ErrorAnalytics::new()),
            recorder: None,
            online: AtomicBool::new(true),
            identity: RwLock::new(None),
        }
    }

    /// Forward every classified error to `recorder`.
    pub fn with_recorder(mut self, recorder: Arc<dyn AnalyticsRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn analytics(&self) -> &Arc<ErrorAnalytics> {
        &self.analytics
    }

    pub(crate) fn recorder(&self) -> Option<&Arc<dyn AnalyticsRecorder>> {
        self.recorder.as_ref()
    }

    /// Update the reachability flag. While offline every failure is
    /// classified as a network error.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Identity attached to subsequently classified errors.
    pub fn set_identity(&self, identity: Option<String>) {
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = identity;
    }

    /// Classify a raw failure. Never fails.
    pub fn classify(&self, raw: impl Into<RawError>, context: Option<&str>) -> ClassifiedError {
        let raw = raw.into();
        let identity = self
            .identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let classified = classify_raw(&raw, self.is_online())
            .with_context(context)
            .with_identity(identity);

        self.track(&classified);
        classified
    }

    /// Record an instance derived from an earlier classification.
    pub(crate) fn track(&self, error: &ClassifiedError) {
        self.analytics.record(error);
        if let Some(recorder) = &self.recorder {
            recorder.record(&AnalyticsEvent::ErrorClassified(error.clone()));
        }
    }
}

impl std::fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("online", &self.is_online())
            .field("has_recorder", &self.recorder.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_json_parse_failure_is_malformed() {
        let raw = RawError::Parse {
            message: "Unexpected token < in JSON at position 0".to_string(),
        };
        let err = classify_raw(&raw, true);
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert_eq!(err.recovery(), RecoveryStrategy::None);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_non_wire_syntax_error_falls_through_to_unknown() {
        let raw = RawError::Parse {
            message: "unexpected end of input".to_string(),
        };
        assert_eq!(classify_raw(&raw, true).kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_parse_failure_wins_over_offline() {
        let raw = RawError::Parse {
            message: "JSON parse error".to_string(),
        };
        assert_eq!(
            classify_raw(&raw, false).kind(),
            ErrorKind::MalformedResponse
        );
    }

    #[test]
    fn test_offline_flag_overrides_http_status() {
        let err = classify_raw(&RawError::status(500), false);
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.severity(), Severity::Low);
    }

    #[test]
    fn test_no_response_is_network() {
        let raw = RawError::NoResponse {
            message: "timeout".to_string(),
        };
        let err = classify_raw(&raw, true);
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.recovery(), RecoveryStrategy::Retry);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (401, ErrorKind::Authentication, Severity::Medium, RecoveryStrategy::ReLogin, false),
            (403, ErrorKind::PermissionDenied, Severity::High, RecoveryStrategy::ReLogin, false),
            (429, ErrorKind::RateLimited, Severity::Medium, RecoveryStrategy::None, false),
            (500, ErrorKind::ServerError, Severity::Medium, RecoveryStrategy::Retry, true),
            (503, ErrorKind::ServerError, Severity::Medium, RecoveryStrategy::Retry, true),
            (400, ErrorKind::Validation, Severity::Medium, RecoveryStrategy::None, false),
            (422, ErrorKind::Validation, Severity::Medium, RecoveryStrategy::None, false),
        ];

        for (status, kind, severity, recovery, retryable) in cases {
            let err = classify_raw(&RawError::status(status), true);
            assert_eq!(err.kind(), kind, "status {status}");
            assert_eq!(err.severity(), severity, "status {status}");
            assert_eq!(err.recovery(), recovery, "status {status}");
            assert_eq!(err.is_retryable(), retryable, "status {status}");
            assert_eq!(err.code(), Some(format!("HTTP_{status}").as_str()));
        }
    }

    #[test]
    fn test_server_code_is_preferred() {
        let raw = RawError::Http {
            status: 422,
            message: Some("bad portion".to_string()),
            code: Some("INVALID_PORTION".to_string()),
        };
        assert_eq!(classify_raw(&raw, true).code(), Some("INVALID_PORTION"));
    }

    #[test]
    fn test_401_wins_over_token_expiry_message() {
        let raw = RawError::Http {
            status: 401,
            message: Some("jwt expired".to_string()),
            code: None,
        };
        assert_eq!(
            classify_raw(&raw, true).recovery(),
            RecoveryStrategy::ReLogin
        );
    }

    #[test]
    fn test_token_expiry_requests_refresh() {
        let err = classify_raw(
            &RawError::TokenExpired {
                message: "expired".to_string(),
            },
            true,
        );
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.recovery(), RecoveryStrategy::RefreshToken);
        assert!(err.is_retryable());

        let from_message = classify_raw(&RawError::Message("Token has expired".to_string()), true);
        assert_eq!(from_message.recovery(), RecoveryStrategy::RefreshToken);
    }

    #[test]
    fn test_default_is_unknown() {
        for raw in [
            RawError::Empty,
            RawError::Message("weird".to_string()),
            RawError::Value(json!({ "foo": "bar" })),
            RawError::status(302),
        ] {
            let err = classify_raw(&raw, true);
            assert_eq!(err.kind(), ErrorKind::Unknown);
            assert!(!err.is_retryable());
            assert_eq!(err.user_message(), ErrorKind::Unknown.user_message());
        }
    }

    #[test]
    fn test_classifier_records_analytics_with_identity() {
        let classifier = ErrorClassifier::new();
        classifier.set_identity(Some("user-42".to_string()));

        let err = classifier.classify(RawError::status(500), Some("sync_goals"));
        assert_eq!(err.context(), Some("sync_goals"));
        assert_eq!(err.identity(), Some("user-42"));

        let record = classifier.analytics().get(ErrorKind::ServerError).unwrap();
        assert_eq!(record.frequency, 1);
        assert!(record.affected_identities.contains("user-42"));
    }

    #[test]
    fn test_classifier_online_flag() {
        let classifier = ErrorClassifier::new();
        assert!(classifier.is_online());

        classifier.set_online(false);
        let err = classifier.classify(RawError::status(404), None);
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_classifier_accepts_js_shaped_values() {
        let classifier = ErrorClassifier::new();
        let err = classifier.classify(json!({ "response": { "status": 403 } }), None);
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let err = classifier.classify(serde_json::Value::Null, None);
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[derive(Default)]
    struct CollectingRecorder {
        events: Mutex<Vec<AnalyticsEvent>>,
    }

    impl AnalyticsRecorder for CollectingRecorder {
        fn record(&self, event: &AnalyticsEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_classifier_forwards_to_recorder() {
        let recorder = Arc::new(CollectingRecorder::default());
        let classifier = ErrorClassifier::new().with_recorder(recorder.clone());

        classifier.classify("boom", None);

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AnalyticsEvent::ErrorClassified(_)));
    }
}
