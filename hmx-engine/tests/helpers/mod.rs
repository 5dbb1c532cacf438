//! Test Helper Utilities
//!
//! In-process providers and fixtures shared by the hmx-engine integration
//! tests.

#![allow(dead_code)]

use async_trait::async_trait;
use hmx_common::AnalysisResult;
use hmx_engine::{AnalysisProvider, AnalysisRequest, MetricsSnapshot, ProviderError, RequestCoordinator};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What the scripted provider does on one call
#[derive(Debug, Clone)]
pub enum Step {
    Fail(ProviderError),
    Panic,
}

/// Provider that counts calls, optionally sleeps, and replays scripted
/// failures before succeeding
pub struct ScriptedProvider {
    calls: AtomicUsize,
    delay: Duration,
    script: Mutex<VecDeque<Step>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue steps consumed one per call; once empty every call succeeds
    pub fn then(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.lock().unwrap().extend(steps);
        self
    }

    pub fn failing(self, error: ProviderError, times: usize) -> Self {
        self.then(std::iter::repeat(Step::Fail(error)).take(times))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Deterministic fixture for a source; the identifier is deliberately not
/// echoed back
pub fn fixture(source: &str) -> AnalysisResult {
    let bpm = 110 + (source.len() % 30) as u16;
    AnalysisResult::new("scripted", bpm, "8A".parse().unwrap()).with_energy(0.6)
}

#[async_trait]
impl AnalysisProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Panic) => panic!("scripted provider panic"),
            None => Ok(fixture(&request.source_identifier)),
        }
    }
}

/// Track fixture for scoring tests
pub fn track(id: &str, bpm: u16, camelot: &str, energy: f64) -> AnalysisResult {
    AnalysisResult::new(id, bpm, camelot.parse().unwrap()).with_energy(energy)
}

/// Let spawned tasks run until `condition` holds for the coordinator's
/// metrics and in-flight count
pub async fn wait_for<F>(coordinator: &RequestCoordinator, condition: F)
where
    F: Fn(&MetricsSnapshot, usize) -> bool,
{
    for _ in 0..10_000 {
        let metrics = coordinator.metrics().await;
        let in_flight = coordinator.in_flight().await;
        if condition(&metrics, in_flight) {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("coordinator never reached the expected state");
}
