//! HTTP analysis provider
//!
//! Posts `{"sourceIdentifier": ...}` to `{base_url}/analyze` and decodes the
//! camelCase `AnalysisResult` payload. Requests are throttled client-side with
//! a token-bucket rate limiter.
//!
//! Status classification:
//! - 429 -> `RateLimited` (retryable)
//! - 5xx -> `Unavailable` (retryable)
//! - other non-2xx -> `Rejected`
//! - undecodable or inconsistent body -> `MalformedResponse`

use super::{AnalysisProvider, AnalysisRequest, ProviderError};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use hmx_common::config::ProviderSettings;
use hmx_common::{AnalysisResult, Error};
use reqwest::{Client, StatusCode};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const USER_AGENT: &str = concat!("hmx/", env!("CARGO_PKG_VERSION"));
const ERROR_BODY_LIMIT: usize = 200;

/// Remote analysis service client
pub struct HttpAnalysisProvider {
    client: Client,
    base_url: String,
    /// Set while the client knows it has no network; calls fail fast
    offline: AtomicBool,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl HttpAnalysisProvider {
    pub fn new(settings: &ProviderSettings) -> hmx_common::Result<Self> {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        let parsed = reqwest::Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("Invalid provider URL {:?}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Provider URL must be http or https: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url,
            offline: AtomicBool::new(false),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn endpoint(&self) -> String {
        format!("{}/analyze", self.base_url)
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}

/// Map a non-success HTTP status to a provider error
pub(crate) fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited
    } else if status.is_server_error() {
        ProviderError::Unavailable {
            status: status.as_u16(),
            message: truncate(body),
        }
    } else {
        ProviderError::Rejected {
            status: status.as_u16(),
            message: truncate(body),
        }
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ProviderError> {
        if self.is_offline() {
            return Err(ProviderError::Offline);
        }

        self.rate_limiter.until_ready().await;

        tracing::debug!(
            source = %request.source_identifier,
            url = %self.endpoint(),
            "Requesting analysis"
        );

        let response = self
            .client
            .post(self.endpoint())
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        serde_json::from_str::<AnalysisResult>(&body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }
}
