//! Bounded per-category buffers of recent inbound messages.

use std::collections::{HashMap, VecDeque};

use super::messages::InboundMessage;

/// Categories that keep a rolling history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryCategory {
    Metrics,
    Alerts,
    Predictions,
}

impl HistoryCategory {
    pub fn of(message: &InboundMessage) -> Option<Self> {
        match message {
            InboundMessage::HealthMetricsUpdate(_) => Some(HistoryCategory::Metrics),
            InboundMessage::RealTimeAlert(_) => Some(HistoryCategory::Alerts),
            InboundMessage::PredictionUpdate(_) => Some(HistoryCategory::Predictions),
            InboundMessage::SystemStatus(_) | InboundMessage::UserActivity(_) => None,
        }
    }
}

/// Fixed-size FIFO buffers; the oldest entry is evicted on overflow.
#[derive(Debug)]
pub struct RollingHistory {
    limit: usize,
    buffers: HashMap<HistoryCategory, VecDeque<InboundMessage>>,
}

impl RollingHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            buffers: HashMap::new(),
        }
    }

    /// Record `message` if its category keeps history.
    pub fn push(&mut self, message: &InboundMessage) {
        let Some(category) = HistoryCategory::of(message) else {
            return;
        };
        if self.limit == 0 {
            return;
        }

        let buffer = self.buffers.entry(category).or_default();
        while buffer.len() >= self.limit {
            buffer.pop_front();
        }
        buffer.push_back(message.clone());
    }

    /// Oldest first.
    pub fn get(&self, category: HistoryCategory) -> Vec<InboundMessage> {
        self.buffers
            .get(&category)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, category: HistoryCategory) -> usize {
        self.buffers.get(&category).map_or(0, VecDeque::len)
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
