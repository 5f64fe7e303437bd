//! The classified error value handed between classifier, engine and callers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::category::{ErrorKind, RecoveryStrategy, Severity};

/// A normalized failure with an assigned recovery strategy.
///
/// Instances are immutable. Every retry attempt or escalation produces a new
/// value through one of the `pub(crate)` derivation methods, so the analytics
/// recorder sees each instance that exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedError {
    kind: ErrorKind,
    code: Option<String>,
    message: String,
    user_message: String,
    severity: Severity,
    recovery: RecoveryStrategy,
    retryable: bool,
    retry_count: u32,
    timestamp: DateTime<Utc>,
    context: Option<String>,
    identity: Option<String>,
}

impl ClassifiedError {
    pub(crate) fn new(
        kind: ErrorKind,
        severity: Severity,
        recovery: RecoveryStrategy,
        retryable: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            user_message: kind.user_message().to_string(),
            severity,
            recovery,
            retryable,
            retry_count: 0,
            timestamp: Utc::now(),
            context: None,
            identity: None,
        }
    }

    pub(crate) fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code;
        self
    }

    pub(crate) fn with_context(mut self, context: Option<&str>) -> Self {
        self.context = context.map(str::to_string);
        self
    }

    pub(crate) fn with_identity(mut self, identity: Option<String>) -> Self {
        self.identity = identity;
        self
    }

    pub(crate) fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Copy of this error that the engine must not retry again.
    pub(crate) fn into_terminal(self) -> Self {
        Self {
            retryable: false,
            timestamp: Utc::now(),
            ..self
        }
    }

    /// Copy of this error escalated to forced re-authentication.
    ///
    /// Used when a token refresh failed; that failure is the new evidence
    /// allowing the severity to rise.
    pub(crate) fn escalate_to_relogin(self) -> Self {
        Self {
            kind: ErrorKind::Authentication,
            user_message: ErrorKind::Authentication.user_message().to_string(),
            severity: self.severity.escalate_to(Severity::High),
            recovery: RecoveryStrategy::ReLogin,
            retryable: false,
            timestamp: Utc::now(),
            ..self
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Technical message, for logs only.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Human-readable message safe to show to the user.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn recovery(&self) -> RecoveryStrategy {
        self.recovery
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Operation label supplied at classification time.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Identity of the affected user, if known.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Returns true if the caller has to show this error to the user.
    pub fn is_terminal(&self) -> bool {
        !self.retryable || !self.recovery.is_automatic()
    }

    /// Get a formatted string suitable for logging.
    pub fn to_log_string(&self) -> String {
        let mut parts = vec![
            format!("error={}", self.kind.error_code()),
            format!("kind={}", self.kind),
            format!("severity={}", self.severity),
            format!("recovery={}", self.recovery),
            format!("retryable={}", self.retryable),
        ];

        if let Some(ref code) = self.code {
            parts.push(format!("code={}", code));
        }

        if let Some(ref context) = self.context {
            parts.push(format!("context={}", context));
        }

        if self.retry_count > 0 {
            parts.push(format!("retry_count={}", self.retry_count));
        }

        parts.push(format!("timestamp={}", self.timestamp.to_rfc3339()));

        parts.join(" ")
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)?;

        if let Some(ref context) = self.context {
            write!(f, " [{}]", context)?;
        }

        Ok(())
    }
}

impl std::error::Error for ClassifiedError {}
