//! Request metrics
//!
//! Counters plus a bounded history of completed provider attempts. Visibility
//! only: nothing in the coordinator reads these back to make decisions.

use crate::error::AnalysisError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

/// Result of a single provider attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { kind: String, message: String },
}

/// One completed provider attempt
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub id: Uuid,
    /// Cache key of the request
    pub key: String,
    /// 1-based attempt number within its request
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}

/// Point-in-time copy of the counters and history
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_attempts: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Callers that joined an in-flight request instead of starting one
    pub deduplicated: u64,
    pub history: Vec<RequestRecord>,
}

impl MetricsSnapshot {
    /// Fraction of cache lookups that hit, 0.0 when there were none
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// Counters and bounded attempt history
#[derive(Debug)]
pub struct RequestMetrics {
    history: VecDeque<RequestRecord>,
    capacity: usize,
    total_attempts: u64,
    succeeded: u64,
    failed: u64,
    retries: u64,
    cache_hits: u64,
    cache_misses: u64,
    deduplicated: u64,
}

impl RequestMetrics {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total_attempts: 0,
            succeeded: 0,
            failed: 0,
            retries: 0,
            cache_hits: 0,
            cache_misses: 0,
            deduplicated: 0,
        }
    }

    pub fn record_attempt(
        &mut self,
        key: &str,
        attempt: u32,
        outcome: &Result<(), AnalysisError>,
        elapsed: Duration,
    ) {
        self.total_attempts += 1;
        if attempt > 1 {
            self.retries += 1;
        }

        let outcome = match outcome {
            Ok(()) => {
                self.succeeded += 1;
                AttemptOutcome::Succeeded
            }
            Err(err) => {
                self.failed += 1;
                AttemptOutcome::Failed {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                }
            }
        };

        if self.capacity == 0 {
            return;
        }
        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(RequestRecord {
            id: Uuid::new_v4(),
            key: key.to_string(),
            attempt,
            outcome,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            completed_at: Utc::now(),
        });
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_cache_miss(&mut self) {
        self.cache_misses += 1;
    }

    pub fn record_deduplicated(&mut self) {
        self.deduplicated += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_attempts: self.total_attempts,
            succeeded: self.succeeded,
            failed: self.failed,
            retries: self.retries,
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            deduplicated: self.deduplicated,
            history: self.history.iter().cloned().collect(),
        }
    }
}
