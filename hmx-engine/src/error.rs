//! Error types for hmx-engine
//!
//! `AnalysisError` is `Clone`: one in-flight request hands the same outcome to
//! every caller that joined it.

use std::time::Duration;
use thiserror::Error;

/// Terminal failure of an analysis request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// Malformed source identifier; never retried
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An attempt exceeded its deadline
    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Network failure, provider overload or rate limit
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Malformed provider response or offline client; fails fast
    #[error("Non-retryable failure: {0}")]
    NonRetryable(String),

    /// Caller aborted the request
    #[error("Request cancelled")]
    Cancelled,

    /// The in-flight task vanished without producing an outcome
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::Timeout(_) | AnalysisError::Transient(_))
    }

    /// Short label used in metrics records
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidInput(_) => "invalid_input",
            AnalysisError::Timeout(_) => "timeout",
            AnalysisError::Transient(_) => "transient",
            AnalysisError::NonRetryable(_) => "non_retryable",
            AnalysisError::Cancelled => "cancelled",
            AnalysisError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AnalysisError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(AnalysisError::Transient("503".into()).is_retryable());
        assert!(!AnalysisError::InvalidInput("".into()).is_retryable());
        assert!(!AnalysisError::NonRetryable("bad json".into()).is_retryable());
        assert!(!AnalysisError::Cancelled.is_retryable());
        assert!(!AnalysisError::Internal("panic".into()).is_retryable());
    }
}
