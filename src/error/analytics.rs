//! Error analytics and the observability hook.
//!
//! [`ErrorAnalytics`] accumulates per-kind counters for every classified
//! error. [`AnalyticsRecorder`] is the seam to whatever observability
//! backend the application uses; it only observes and never feeds back into
//! control flow.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::category::ErrorKind;
use super::classified::ClassifiedError;
use crate::connection::ConnectionState;

/// Accumulated statistics for one error kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorAnalyticsRecord {
    pub frequency: u64,
    pub affected_identities: HashSet<String>,
    pub last_seen: DateTime<Utc>,
}

/// Monotonic per-kind error counters.
#[derive(Debug, Default)]
pub struct ErrorAnalytics {
    records: Mutex<HashMap<ErrorKind, ErrorAnalyticsRecord>>,
}

impl ErrorAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one classified error.
    pub fn record(&self, error: &ClassifiedError) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .entry(error.kind())
            .or_insert_with(|| ErrorAnalyticsRecord {
                frequency: 0,
                affected_identities: HashSet::new(),
                last_seen: error.timestamp(),
            });

        record.frequency += 1;
        record.last_seen = record.last_seen.max(error.timestamp());
        if let Some(identity) = error.identity() {
            record.affected_identities.insert(identity.to_string());
        }
    }

    /// Snapshot of the record for one kind.
    pub fn get(&self, kind: ErrorKind) -> Option<ErrorAnalyticsRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    pub fn frequency(&self, kind: ErrorKind) -> u64 {
        self.get(kind).map_or(0, |r| r.frequency)
    }

    /// Snapshot of every record.
    pub fn snapshot(&self) -> HashMap<ErrorKind, ErrorAnalyticsRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clear all counters.
    pub fn reset(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// How a recovery attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The operation eventually succeeded.
    Recovered { attempts: u32 },
    /// Retries were used up.
    Exhausted { attempts: u32 },
    /// Token refresh failed and the session was cleared.
    Escalated,
    /// Nothing automatic could be done.
    Terminal,
    /// The caller cancelled while recovery was pending.
    Cancelled,
}

/// Events delivered to an [`AnalyticsRecorder`].
#[derive(Debug, Clone)]
pub enum AnalyticsEvent {
    ErrorClassified(ClassifiedError),
    RecoveryFinished {
        kind: ErrorKind,
        outcome: RecoveryOutcome,
    },
    ConnectionStateChanged(ConnectionState),
    MaxReconnectAttemptsReached {
        attempts: u32,
    },
}

/// Receives observability events.
pub trait AnalyticsRecorder: Send + Sync {
    fn record(&self, event: &AnalyticsEvent);
}

/// Recorder that writes events to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl AnalyticsRecorder for TracingRecorder {
    fn record(&self, event: &AnalyticsEvent) {
        match event {
            AnalyticsEvent::ErrorClassified(err) => {
                debug!(target: "nutrilink::analytics", "classified: {}", err.to_log_string());
            }
            AnalyticsEvent::RecoveryFinished { kind, outcome } => {
                info!(target: "nutrilink::analytics", "recovery for {} finished: {:?}", kind, outcome);
            }
            AnalyticsEvent::ConnectionStateChanged(state) => {
                debug!(target: "nutrilink::analytics", "connection state: {}", state);
            }
            AnalyticsEvent::MaxReconnectAttemptsReached { attempts } => {
                warn!(
                    target: "nutrilink::analytics",
                    "gave up reconnecting after {} attempts", attempts
                );
            }
        }
    }
}
