//! # HMX Engine Library (hmx-engine)
//!
//! Request orchestration and harmonic compatibility for track analysis.
//!
//! **Purpose:** Front a slow, unreliable analysis provider with a bounded TTL
//! cache, in-flight de-duplication, per-attempt timeouts, retries with
//! exponential backoff and cancellation; then score, sequence and recommend
//! tracks using the Camelot wheel.
//!
//! **Architecture:**
//! - `coordinator`: `RequestCoordinator`, the only stateful component
//! - `cache`: bounded TTL store and its JSON persistence
//! - `provider`: `AnalysisProvider` trait and the HTTP implementation
//! - `harmonic`: pure scoring, sequencing and recommendation
//! - `metrics`: attempt counters and bounded history

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod harmonic;
pub mod metrics;
pub mod provider;

pub use cache::{CachePersistence, CacheStore};
pub use coordinator::{Analysis, AnalysisOrigin, AnalyzeOptions, CoordinatorConfig, RequestCoordinator};
pub use error::AnalysisError;
pub use harmonic::{build_sequence, plan_set, recommend, score, TransitionKind};
pub use metrics::MetricsSnapshot;
pub use provider::{AnalysisProvider, AnalysisRequest, HttpAnalysisProvider, ProviderError};
