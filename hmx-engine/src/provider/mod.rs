//! Analysis provider interface
//!
//! The provider performs the actual tempo/key/energy analysis. The request
//! coordinator treats it as opaque: a call either succeeds, fails in a way
//! that is worth retrying, or fails in a way that is not. Deadlines are
//! enforced by the coordinator, not the provider.

pub mod http;

pub use http::HttpAnalysisProvider;

use crate::error::AnalysisError;
use async_trait::async_trait;
use hmx_common::AnalysisResult;
use serde::Serialize;
use thiserror::Error;

/// Input sent to a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub source_identifier: String,
}

/// Provider failure, classified for the retry loop
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Client is offline")]
    Offline,
}

impl ProviderError {
    /// Whether the coordinator should try again after backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Network(_) | ProviderError::Unavailable { .. } | ProviderError::RateLimited
        )
    }
}

impl From<ProviderError> for AnalysisError {
    fn from(err: ProviderError) -> Self {
        if err.is_retryable() {
            AnalysisError::Transient(err.to_string())
        } else {
            AnalysisError::NonRetryable(err.to_string())
        }
    }
}

/// Backend that turns a source identifier into an `AnalysisResult`
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Analyze one source
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ProviderError>;
}
