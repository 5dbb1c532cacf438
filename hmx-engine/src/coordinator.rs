//! Request coordinator
//!
//! Turns calls to an `AnalysisProvider` into cached, de-duplicated, retried
//! and cancellable operations.
//!
//! **Flow:**
//! 1. Validate the identifier and hash it into a cache key
//! 2. Unless `force_refresh`, return a live cache entry
//! 3. Join the in-flight request for the key if one exists
//! 4. Otherwise register a new in-flight request and run the attempt loop in
//!    its own task
//! 5. On settle: cache the result (success only) and deregister, in one
//!    critical section; every joined caller sees the same outcome
//!
//! Cache, in-flight registry and metrics share one lock, so the
//! check-then-register in steps 2-4 cannot race: at most one provider call is
//! in flight per key.

use crate::cache::{CachePersistence, CacheStore};
use crate::error::AnalysisError;
use crate::metrics::{MetricsSnapshot, RequestMetrics};
use crate::provider::{AnalysisProvider, AnalysisRequest};
use futures::future::{BoxFuture, FutureExt, Shared};
use hmx_common::config::AnalysisSettings;
use hmx_common::AnalysisResult;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type SharedOutcome = Shared<BoxFuture<'static, Result<AnalysisResult, AnalysisError>>>;

/// Coordinator settings fixed at construction
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub cache_ttl: Duration,
    pub max_cache_entries: usize,
    pub history_capacity: usize,
    /// Persist the cache to this JSON file after every mutation
    pub cache_file: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&AnalysisSettings::default())
    }
}

impl From<&AnalysisSettings> for CoordinatorConfig {
    fn from(settings: &AnalysisSettings) -> Self {
        Self {
            timeout: settings.timeout(),
            max_retries: settings.max_retries,
            base_delay: settings.base_delay(),
            cache_ttl: settings.cache_ttl(),
            max_cache_entries: settings.max_cache_entries,
            history_capacity: settings.history_capacity,
            cache_file: settings.cache_file.clone(),
        }
    }
}

/// Per-call overrides; `None` falls back to the coordinator config
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Skip the cache read (the result is still cached)
    pub force_refresh: bool,
    pub timeout: Option<Duration>,
    /// Retry retryable failures; `false` makes exactly one attempt
    pub retry: Option<bool>,
    pub max_retries: Option<u32>,
    pub base_delay: Option<Duration>,
    pub cache_ttl: Option<Duration>,
    /// Cancels the request this call starts, or abandons the wait if it joins
    /// one already in flight
    pub cancel: Option<CancellationToken>,
}

impl AnalyzeOptions {
    pub fn force_refresh() -> Self {
        Self {
            force_refresh: true,
            ..Self::default()
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry = Some(false);
        self
    }
}

/// Where an analysis came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOrigin {
    Cache,
    Fresh,
}

/// Successful analysis tagged with its origin
#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: AnalysisResult,
    pub origin: AnalysisOrigin,
}

impl Analysis {
    pub fn is_cached(&self) -> bool {
        self.origin == AnalysisOrigin::Cache
    }

    pub fn into_result(self) -> AnalysisResult {
        self.result
    }
}

/// Effective attempt parameters for one in-flight request
#[derive(Debug, Clone, Copy)]
struct AttemptPlan {
    timeout: Duration,
    max_attempts: u32,
    base_delay: Duration,
    cache_ttl: Duration,
}

impl AttemptPlan {
    fn resolve(config: &CoordinatorConfig, options: &AnalyzeOptions) -> Self {
        let retry = options.retry.unwrap_or(true);
        let max_retries = options.max_retries.unwrap_or(config.max_retries);
        Self {
            timeout: options.timeout.unwrap_or(config.timeout),
            max_attempts: if retry { max_retries.saturating_add(1) } else { 1 },
            base_delay: options.base_delay.unwrap_or(config.base_delay),
            cache_ttl: options.cache_ttl.unwrap_or(config.cache_ttl),
        }
    }

    /// Delay after failed attempt `attempt`: `base_delay * 2^(attempt-1)`
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// A registered in-flight request
struct InFlight {
    id: Uuid,
    outcome: SharedOutcome,
    cancel: CancellationToken,
}

struct CoordinatorState {
    cache: CacheStore,
    pending: HashMap<String, InFlight>,
    metrics: RequestMetrics,
}

struct Inner {
    config: CoordinatorConfig,
    provider: Arc<dyn AnalysisProvider>,
    state: Mutex<CoordinatorState>,
    persistence: Option<CachePersistence>,
    /// Serializes snapshot+write so flushes land in mutation order
    flush_lock: Mutex<()>,
}

/// Cached, de-duplicating, retrying front end for an `AnalysisProvider`
///
/// Cheap to clone; clones share the same cache and in-flight registry.
#[derive(Clone)]
pub struct RequestCoordinator {
    inner: Arc<Inner>,
}

/// Stable cache key for a source identifier (SHA-256 hex of the trimmed text)
pub fn cache_key(source_identifier: &str) -> String {
    format!("{:x}", Sha256::digest(source_identifier.trim().as_bytes()))
}

/// Check that an identifier is usable; URL-shaped identifiers must be http(s)
pub fn validate_source(source_identifier: &str) -> Result<&str, AnalysisError> {
    let trimmed = source_identifier.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "source identifier must not be empty".to_string(),
        ));
    }

    if trimmed.contains("://") {
        let url = reqwest::Url::parse(trimmed).map_err(|e| {
            AnalysisError::InvalidInput(format!("invalid URL {:?}: {}", trimmed, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AnalysisError::InvalidInput(format!(
                "unsupported URL scheme {:?}",
                url.scheme()
            )));
        }
    }

    Ok(trimmed)
}

impl RequestCoordinator {
    pub fn new(provider: Arc<dyn AnalysisProvider>, config: CoordinatorConfig) -> Self {
        let state = CoordinatorState {
            cache: CacheStore::new(config.max_cache_entries),
            pending: HashMap::new(),
            metrics: RequestMetrics::new(config.history_capacity),
        };
        let persistence = config
            .cache_file
            .as_ref()
            .map(|path| CachePersistence::new(path.clone()));

        Self {
            inner: Arc::new(Inner {
                config,
                provider,
                state: Mutex::new(state),
                persistence,
                flush_lock: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Analyze one source, from cache when possible
    pub async fn analyze(
        &self,
        source_identifier: &str,
        options: AnalyzeOptions,
    ) -> Result<Analysis, AnalysisError> {
        let source = validate_source(source_identifier)?;
        let key = cache_key(source);

        let (outcome, joined) = {
            let mut state = self.inner.state.lock().await;

            if !options.force_refresh {
                if let Some(hit) = state.cache.get(&key).cloned() {
                    state.metrics.record_cache_hit();
                    debug!(key = %key, source = %source, "Cache hit");
                    return Ok(Analysis {
                        result: hit,
                        origin: AnalysisOrigin::Cache,
                    });
                }
                state.metrics.record_cache_miss();
            }

            if let Some(in_flight) = state.pending.get(&key) {
                let outcome = in_flight.outcome.clone();
                state.metrics.record_deduplicated();
                debug!(key = %key, source = %source, "Joining in-flight request");
                (outcome, true)
            } else {
                let plan = AttemptPlan::resolve(&self.inner.config, &options);
                let in_flight = self.launch(key.clone(), source.to_string(), plan, options.cancel.as_ref());
                let outcome = in_flight.outcome.clone();
                state.pending.insert(key.clone(), in_flight);
                (outcome, false)
            }
        };

        let result = match (joined, options.cancel) {
            (true, Some(token)) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(AnalysisError::Cancelled),
                    result = outcome => result,
                }
            }
            _ => outcome.await,
        };

        result.map(|result| Analysis {
            result,
            origin: AnalysisOrigin::Fresh,
        })
    }

    /// Analyze several sources concurrently; results keep input order
    pub async fn analyze_many<S: AsRef<str>>(
        &self,
        source_identifiers: &[S],
        options: AnalyzeOptions,
    ) -> Vec<Result<Analysis, AnalysisError>> {
        let requests = source_identifiers
            .iter()
            .map(|source| self.analyze(source.as_ref(), options.clone()));
        futures::future::join_all(requests).await
    }

    /// Spawn the attempt loop for `key`; caller must hold the state lock
    fn launch(
        &self,
        key: String,
        source: String,
        plan: AttemptPlan,
        caller_cancel: Option<&CancellationToken>,
    ) -> InFlight {
        let id = Uuid::new_v4();
        let cancel = caller_cancel
            .map(CancellationToken::child_token)
            .unwrap_or_default();

        debug!(
            key = %key,
            source = %source,
            max_attempts = plan.max_attempts,
            "Starting provider request"
        );

        let handle = tokio::spawn(run_in_flight(
            Arc::clone(&self.inner),
            id,
            key.clone(),
            source,
            plan,
            cancel.clone(),
        ));

        let inner = Arc::clone(&self.inner);
        let outcome = async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    // Aborted, e.g. by runtime shutdown
                    inner.deregister(&key, id).await;
                    error!(key = %key, error = %join_error, "Analysis task failed");
                    Err(AnalysisError::Internal(format!("analysis task failed: {}", join_error)))
                }
            }
        }
        .boxed()
        .shared();

        InFlight { id, outcome, cancel }
    }

    /// Cancel the in-flight request for a source; joined callers get `Cancelled`
    pub async fn cancel(&self, source_identifier: &str) -> bool {
        let Ok(source) = validate_source(source_identifier) else {
            return false;
        };
        let key = cache_key(source);
        let state = self.inner.state.lock().await;
        match state.pending.get(&key) {
            Some(in_flight) => {
                info!(key = %key, source = %source, "Cancelling in-flight request");
                in_flight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight request; returns how many were signalled
    pub async fn cancel_all(&self) -> usize {
        let state = self.inner.state.lock().await;
        for in_flight in state.pending.values() {
            in_flight.cancel.cancel();
        }
        state.pending.len()
    }

    /// Number of requests currently in flight
    pub async fn in_flight(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    /// Cached result for a source, if live; never calls the provider
    pub async fn cached(&self, source_identifier: &str) -> Option<AnalysisResult> {
        let source = validate_source(source_identifier).ok()?;
        let key = cache_key(source);
        self.inner.state.lock().await.cache.get(&key).cloned()
    }

    /// Drop the cached result for a source
    pub async fn invalidate(&self, source_identifier: &str) -> bool {
        let Ok(source) = validate_source(source_identifier) else {
            return false;
        };
        let key = cache_key(source);
        let removed = self.inner.state.lock().await.cache.remove(&key);
        if removed {
            self.inner.flush_cache().await;
        }
        removed
    }

    pub async fn clear_cache(&self) {
        self.inner.state.lock().await.cache.clear();
        self.inner.flush_cache().await;
    }

    pub async fn cache_len(&self) -> usize {
        self.inner.state.lock().await.cache.len()
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.inner.state.lock().await.metrics.snapshot()
    }

    /// Restore the cache from the configured file; returns entries restored
    ///
    /// Without a configured file this is a no-op returning 0.
    pub async fn load_persisted(&self) -> hmx_common::Result<usize> {
        let Some(persistence) = &self.inner.persistence else {
            return Ok(0);
        };
        let records = persistence.load().await?;
        let restored = self
            .inner
            .state
            .lock()
            .await
            .cache
            .restore(records, hmx_common::time::now());
        info!(
            path = %persistence.path().display(),
            restored,
            "Restored analysis cache"
        );
        Ok(restored)
    }
}

impl Inner {
    async fn deregister(&self, key: &str, id: Uuid) {
        let mut state = self.state.lock().await;
        if state.pending.get(key).is_some_and(|in_flight| in_flight.id == id) {
            state.pending.remove(key);
        }
    }

    async fn record_attempt(
        &self,
        key: &str,
        attempt: u32,
        outcome: &Result<AnalysisResult, AnalysisError>,
        elapsed: Duration,
    ) {
        let outcome = outcome.as_ref().map(|_| ()).map_err(Clone::clone);
        self.state
            .lock()
            .await
            .metrics
            .record_attempt(key, attempt, &outcome, elapsed);
    }

    /// Write the current cache to disk if persistence is configured
    ///
    /// Failures are logged; the in-memory cache stays authoritative.
    async fn flush_cache(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let _guard = self.flush_lock.lock().await;
        let records = self.state.lock().await.cache.snapshot();
        if let Err(e) = persistence.save(&records).await {
            warn!(path = %persistence.path().display(), error = %e, "Failed to persist cache");
        }
    }

    /// Bounded attempt loop with per-attempt timeout and exponential backoff
    async fn attempt_loop(
        &self,
        key: &str,
        source: &str,
        plan: AttemptPlan,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let request = AnalysisRequest {
            source_identifier: source.to_string(),
        };
        let mut attempt = 1u32;

        loop {
            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AnalysisError::Cancelled),
                response = tokio::time::timeout(plan.timeout, self.provider.analyze(&request)) => {
                    match response {
                        Ok(Ok(mut result)) => {
                            result.source_identifier = source.to_string();
                            Ok(result)
                        }
                        Ok(Err(provider_error)) => Err(AnalysisError::from(provider_error)),
                        Err(_) => Err(AnalysisError::Timeout(plan.timeout)),
                    }
                }
            };
            self.record_attempt(key, attempt, &outcome, started.elapsed()).await;

            let err = match outcome {
                Ok(result) => {
                    info!(
                        key = %key,
                        source = %source,
                        provider = self.provider.name(),
                        attempt,
                        bpm = result.bpm,
                        camelot = %result.camelot,
                        "Analysis completed"
                    );
                    return Ok(result);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                warn!(key = %key, attempt, error = %err, "Analysis failed, not retrying");
                return Err(err);
            }

            if attempt >= plan.max_attempts {
                error!(
                    key = %key,
                    attempt,
                    max_attempts = plan.max_attempts,
                    error = %err,
                    "Analysis failed, attempts exhausted"
                );
                return Err(err);
            }

            let delay = plan.backoff_delay(attempt);
            warn!(
                key = %key,
                attempt,
                backoff_ms = delay.as_millis() as u64,
                error = %err,
                "Analysis attempt failed, will retry after backoff"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

/// Body of the spawned in-flight task
async fn run_in_flight(
    inner: Arc<Inner>,
    id: Uuid,
    key: String,
    source: String,
    plan: AttemptPlan,
    cancel: CancellationToken,
) -> Result<AnalysisResult, AnalysisError> {
    // Settle even if the provider panics; callers may all be gone
    let result = AssertUnwindSafe(inner.attempt_loop(&key, &source, plan, &cancel))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(key = %key, panic = %message, "Analysis provider panicked");
            Err(AnalysisError::Internal(format!("analysis provider panicked: {}", message)))
        });

    let cached = {
        let mut state = inner.state.lock().await;
        if let Ok(analysis) = &result {
            state.cache.put(key.clone(), analysis.clone(), plan.cache_ttl);
        }
        if state.pending.get(&key).is_some_and(|in_flight| in_flight.id == id) {
            state.pending.remove(&key);
        }
        result.is_ok()
    };

    if cached {
        inner.flush_cache().await;
    }

    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
