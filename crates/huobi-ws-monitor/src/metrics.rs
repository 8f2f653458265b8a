/*
[INPUT]:  Per-topic updates observed by subscription listeners
[OUTPUT]: Snapshot-friendly message counters for periodic status logging
[POS]:    Shared runtime metrics between listeners and the status loop
[UPDATE]: When adding/removing topic-level runtime signals
*/

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSnapshot {
    pub topic: String,
    pub messages: u64,
    pub last_update: Option<Instant>,
}

#[derive(Debug, Default)]
struct TopicCounter {
    messages: u64,
    last_update: Option<Instant>,
}

/// Message counters keyed by topic; clones share the same counters
#[derive(Debug, Clone, Default)]
pub struct TopicMetrics {
    topics: Arc<Mutex<BTreeMap<String, TopicCounter>>>,
}

impl TopicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_update(&self, topic: &str) {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = topics.entry(topic.to_string()).or_default();
        counter.messages += 1;
        counter.last_update = Some(Instant::now());
    }

    pub fn messages(&self, topic: &str) -> u64 {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, |counter| counter.messages)
    }

    pub fn total(&self) -> u64 {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|counter| counter.messages)
            .sum()
    }

    pub fn snapshot(&self) -> Vec<TopicSnapshot> {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(topic, counter)| TopicSnapshot {
                topic: topic.clone(),
                messages: counter.messages,
                last_update: counter.last_update,
            })
            .collect()
    }
}
