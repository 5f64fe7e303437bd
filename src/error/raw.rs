//! Raw, unclassified failures.
//!
//! [`RawError`] is the input side of classification: whatever an API call,
//! a parser or a transport produced, normalized into a small closed set of
//! shapes. Nothing here decides what to do about the failure.

use std::fmt;

use serde_json::Value;

/// A failure as reported by the code that observed it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawError {
    /// The server answered with a non-success status.
    Http {
        status: u16,
        message: Option<String>,
        code: Option<String>,
    },

    /// A request was sent but no response arrived.
    NoResponse { message: String },

    /// The reachability observer reports no connectivity.
    Offline,

    /// A payload could not be parsed.
    Parse { message: String },

    /// The access token is known to be expired.
    TokenExpired { message: String },

    /// A plain error with only a message.
    Message(String),

    /// An arbitrary non-error value that was thrown or returned as an error.
    Value(Value),

    /// Nothing at all (null/undefined).
    Empty,
}

impl RawError {
    /// Shorthand for an HTTP status error without a body.
    pub fn status(status: u16) -> Self {
        RawError::Http {
            status,
            message: None,
            code: None,
        }
    }

    /// Normalize a loosely-shaped error object.
    ///
    /// Recognizes `{ response: { status, data: { message, code } } }`,
    /// `{ request: .. }` without a response, `{ name: "SyntaxError", message }`
    /// and `{ message }`. Anything else is kept as [`RawError::Value`].
    pub fn from_value(value: Value) -> Self {
        let object = match value {
            Value::Null => return RawError::Empty,
            Value::String(message) => return RawError::Message(message),
            Value::Object(ref map) => map,
            other => return RawError::Value(other),
        };

        if let Some(response) = object.get("response").filter(|r| !r.is_null()) {
            if let Some(status) = response.get("status").and_then(Value::as_u64) {
                let data = response.get("data");
                let text = |key: &str| {
                    data.and_then(|d| d.get(key))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                };
                return RawError::Http {
                    status: u16::try_from(status).unwrap_or(0),
                    message: text("message"),
                    code: text("code"),
                };
            }
        }

        let message = object
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);

        if object.get("request").is_some_and(|r| !r.is_null()) {
            return RawError::NoResponse {
                message: message.unwrap_or_else(|| "no response received".to_string()),
            };
        }

        let name = object
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);

        match (name.as_deref(), message) {
            (Some("SyntaxError"), Some(message)) => RawError::Parse { message },
            (Some("TokenExpiredError"), Some(message)) => RawError::TokenExpired { message },
            (_, Some(message)) => RawError::Message(message),
            (_, None) => RawError::Value(value),
        }
    }

    /// HTTP status, if this error carries one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            RawError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Best-effort technical description used for logs, never for users.
    pub fn technical_message(&self) -> String {
        match self {
            RawError::Http {
                status,
                message: Some(message),
                ..
            } => format!("HTTP {}: {}", status, message),
            RawError::Http { status, .. } => format!("HTTP {}", status),
            RawError::NoResponse { message } => format!("no response: {}", message),
            RawError::Offline => "no network connectivity".to_string(),
            RawError::Parse { message } => message.clone(),
            RawError::TokenExpired { message } => message.clone(),
            RawError::Message(message) => message.clone(),
            RawError::Value(value) => value.to_string(),
            RawError::Empty => "unknown error".to_string(),
        }
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.technical_message())
    }
}

impl std::error::Error for RawError {}

impl From<serde_json::Error> for RawError {
    fn from(err: serde_json::Error) -> Self {
        RawError::Parse {
            message: format!("JSON parse error: {}", err),
        }
    }
}

impl From<std::io::Error> for RawError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        match err.kind() {
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::TimedOut
            | Io::BrokenPipe => RawError::NoResponse {
                message: err.to_string(),
            },
            _ => RawError::Message(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for RawError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            RawError::Http {
                status: status.as_u16(),
                message: Some(err.to_string()),
                code: None,
            }
        } else if err.is_connect() || err.is_timeout() || err.is_request() {
            RawError::NoResponse {
                message: err.to_string(),
            }
        } else if err.is_decode() {
            RawError::Parse {
                message: format!("failed to decode JSON response: {}", err),
            }
        } else {
            RawError::Message(err.to_string())
        }
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        RawError::Message(message)
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        RawError::Message(message.to_string())
    }
}

impl From<Value> for RawError {
    fn from(value: Value) -> Self {
        RawError::from_value(value)
    }
}
