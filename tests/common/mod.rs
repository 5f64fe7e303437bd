//! Common test utilities for integration tests.
//!
//! This module provides reusable fixtures and helpers shared by the
//! integration test binaries.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use nutrilink::adapters::mock::MockSession;
use nutrilink::config::RecoveryConfig;
use nutrilink::error::{AnalyticsEvent, AnalyticsRecorder, ErrorClassifier, RecoveryEngine};
use nutrilink::offline::{ActionIntent, MealEntry};

/// Recorder that keeps every analytics event for later assertions.
#[derive(Debug, Default)]
pub struct CollectingRecorder {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl CollectingRecorder {
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&AnalyticsEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }
}

impl AnalyticsRecorder for CollectingRecorder {
    fn record(&self, event: &AnalyticsEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Recovery settings with short delays so paused-time tests stay readable.
pub fn fast_recovery(max_retries: u32) -> RecoveryConfig {
    RecoveryConfig::default()
        .with_max_retries(max_retries)
        .with_retry_delay(Duration::from_millis(100))
        .with_max_retry_delay(Duration::from_secs(1))
}

/// Engine plus the pieces tests want to inspect.
pub struct TestEngine {
    pub engine: Arc<RecoveryEngine>,
    pub classifier: Arc<ErrorClassifier>,
    pub session: Arc<MockSession>,
    pub recorder: Arc<CollectingRecorder>,
}

pub fn test_engine(config: RecoveryConfig, session: MockSession) -> TestEngine {
    let recorder = Arc::new(CollectingRecorder::default());
    let classifier = Arc::new(ErrorClassifier::new().with_recorder(recorder.clone()));
    let session = Arc::new(session);
    let engine = Arc::new(RecoveryEngine::new(
        config,
        classifier.clone(),
        session.clone(),
    ));
    TestEngine {
        engine,
        classifier,
        session,
        recorder,
    }
}

pub fn meal(name: &str, calories: u32) -> ActionIntent {
    ActionIntent::LogMeal(MealEntry {
        name: name.to_string(),
        calories,
        protein_g: None,
        carbs_g: None,
        fat_g: None,
        eaten_at: Utc::now(),
    })
}
