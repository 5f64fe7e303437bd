//! Error classification and recovery.
//!
//! Every failure in the client funnels through the same pipeline:
//!
//! - **Raw errors**: [`RawError`] normalizes anything an API call can fail with
//! - **Classification**: [`ErrorClassifier`] turns a raw error into a
//!   [`ClassifiedError`] with a kind, severity and recovery strategy
//! - **Recovery**: [`RecoveryEngine`] retries, refreshes the token or hands the
//!   error back to the caller as terminal
//! - **Analytics**: [`ErrorAnalytics`] counts every classified instance and an
//!   optional [`AnalyticsRecorder`] observes events
//!
//! # Example
//!
//! ```ignore
//! use nutrilink::error::{ErrorClassifier, RecoveryEngine};
//!
//! let result = engine
//!     .run(|| api.log_water(250), Some("log_water"), &cancel)
//!     .await;
//!
//! match result {
//!     Ok(entry) => println!("Logged {}", entry.id),
//!     Err(err) => eprintln!("{}", err.user_message()),
//! }
//! ```
//!
//! # Error Kinds
//!
//! | Kind | Recovery | Retryable |
//! |------|----------|-----------|
//! | Network | Retry | Yes |
//! | ServerError | Retry | Yes |
//! | Authentication (expired token) | RefreshToken | Yes |
//! | Authentication (401) | ReLogin | No |
//! | PermissionDenied | ReLogin | No |
//! | Validation | None | No |
//! | RateLimited | None | No |
//! | MalformedResponse | None | No |
//! | Unknown | None | No |

mod analytics;
mod category;
mod classified;
mod classifier;
mod raw;
mod recovery;

pub use analytics::{
    AnalyticsEvent, AnalyticsRecorder, ErrorAnalytics, ErrorAnalyticsRecord, RecoveryOutcome,
    TracingRecorder,
};
pub use category::{ErrorKind, RecoveryStrategy, Severity};
pub use classified::ClassifiedError;
pub use classifier::{classify_raw, ErrorClassifier};
pub use raw::RawError;
pub use recovery::RecoveryEngine;
