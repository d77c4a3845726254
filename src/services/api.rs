//! HTTP seam to the try-on generation service.
//!
//! The submit and poll loops never touch `reqwest` directly; they consume
//! [`ApiReply`] values from a [`TryOnApi`] implementation, so the
//! rate-limit and error contract lives in orchestrator code and the loops
//! are testable against a scripted implementation.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;

use crate::models::job::JobId;
use crate::models::request::JobRequest;

/// One HTTP exchange with the service, reduced to what the loops act on.
#[derive(Debug, Clone)]
pub struct ApiReply {
    /// HTTP status code.
    pub status: u16,
    /// `Retry-After` header in whole seconds, when present.
    pub retry_after: Option<u64>,
    /// Raw response body.
    pub body: String,
}

impl ApiReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// Transport-level failure talking to the service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// The two endpoints the orchestrator consumes.
#[async_trait]
pub trait TryOnApi: Send + Sync {
    /// `POST {base}/run` with a job request.
    async fn run(&self, request: &JobRequest) -> Result<ApiReply, ApiError>;

    /// `GET {base}/status/{id}`.
    async fn status(&self, id: &JobId) -> Result<ApiReply, ApiError>;
}

/// reqwest-backed client for the try-on proxy (or the service directly,
/// when an API key is configured).
pub struct HttpTryOnApi {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTryOnApi {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
        })
    }

    async fn reduce(response: reqwest::Response) -> Result<ApiReply, ApiError> {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await?;

        Ok(ApiReply {
            status,
            retry_after,
            body,
        })
    }
}

#[async_trait]
impl TryOnApi for HttpTryOnApi {
    async fn run(&self, request: &JobRequest) -> Result<ApiReply, ApiError> {
        let url = format!("{}/run", self.base_url);
        let mut builder = self.http.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        Self::reduce(builder.send().await?).await
    }

    async fn status(&self, id: &JobId) -> Result<ApiReply, ApiError> {
        let url = format!("{}/status/{}", self.base_url, id);
        let mut builder = self.http.get(&url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        Self::reduce(builder.send().await?).await
    }
}
