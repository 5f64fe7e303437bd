//! Error taxonomy for classified failures.
//!
//! This module defines the closed set of error kinds, severities and
//! recovery strategies that every classified error is mapped onto.

use std::fmt;

use serde::{Deserialize, Serialize};

/// High-level classification of a failure.
///
/// Kinds drive the recovery strategy and the user-facing message; the raw
/// technical message never reaches the user for a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No connectivity, or the request never got a response.
    Network,

    /// The server rejected the request as invalid (4xx other than auth/429).
    Validation,

    /// Credentials are missing, invalid or expired.
    Authentication,

    /// The user is authenticated but not allowed to do this.
    PermissionDenied,

    /// Backend failure (HTTP 5xx).
    ServerError,

    /// A payload could not be parsed.
    MalformedResponse,

    /// Too many requests (HTTP 429).
    RateLimited,

    /// Anything not matched by a more specific rule.
    Unknown,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::Network,
        ErrorKind::Validation,
        ErrorKind::Authentication,
        ErrorKind::PermissionDenied,
        ErrorKind::ServerError,
        ErrorKind::MalformedResponse,
        ErrorKind::RateLimited,
        ErrorKind::Unknown,
    ];

    /// Returns a short label for the kind suitable for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::ServerError => "server_error",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Returns the predefined user-facing message for this kind.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => {
                "You appear to be offline. We'll keep trying and sync your changes when you're back online."
            }
            ErrorKind::Validation => "Some of the information you entered isn't valid. Please check it and try again.",
            ErrorKind::Authentication => "Your session has expired. Please sign in again.",
            ErrorKind::PermissionDenied => "You don't have permission to do that.",
            ErrorKind::ServerError => "Our servers are having trouble right now. Please try again in a moment.",
            ErrorKind::MalformedResponse => {
                "We received an unexpected response. Showing the most recent data we have."
            }
            ErrorKind::RateLimited => "You're doing that too often. Please wait a moment and try again.",
            ErrorKind::Unknown => "Something went wrong. Please try again.",
        }
    }

    /// Returns a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorKind::Network => "E_NETWORK",
            ErrorKind::Validation => "E_VALIDATION",
            ErrorKind::Authentication => "E_AUTH",
            ErrorKind::PermissionDenied => "E_FORBIDDEN",
            ErrorKind::ServerError => "E_SERVER",
            ErrorKind::MalformedResponse => "E_MALFORMED",
            ErrorKind::RateLimited => "E_RATE_LIMITED",
            ErrorKind::Unknown => "E_UNKNOWN",
        }
    }

    /// Returns true for kinds caused by a standing condition that tends to
    /// clear on its own (connectivity, backend outages).
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::ServerError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How bad a failure is, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Raise to at least `floor`. Never lowers the severity.
    pub fn escalate_to(self, floor: Severity) -> Severity {
        self.max(floor)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Policy applied by the recovery engine to a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Terminal: surface to the user as-is.
    None,
    /// Re-invoke the failing operation with linear backoff.
    Retry,
    /// Refresh the access token, then re-issue the request once.
    RefreshToken,
    /// Clear the session and require explicit sign-in.
    ReLogin,
    /// Escalate to support; never retried.
    ContactSupport,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::None => "none",
            RecoveryStrategy::Retry => "retry",
            RecoveryStrategy::RefreshToken => "refresh_token",
            RecoveryStrategy::ReLogin => "re_login",
            RecoveryStrategy::ContactSupport => "contact_support",
        }
    }

    /// Returns true if the engine may act on this strategy without the user.
    pub fn is_automatic(&self) -> bool {
        matches!(self, RecoveryStrategy::Retry | RecoveryStrategy::RefreshToken)
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
