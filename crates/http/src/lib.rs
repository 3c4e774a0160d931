// crates/http/src/lib.rs
//! reqwest-backed [`JobBackend`] for the scan platform's REST API.
//!
//! Endpoints:
//! - `POST /api/scans`: submit a scan
//! - `GET  /api/scans/{id}`: status snapshot
//! - `GET  /api/scans/{id}/result`: full report, available once completed
//! - `POST /api/scans/{id}/cancel`: best-effort cancel
//! - `GET  /api/scans/active`: running scan for this principal, if any

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use codetrace_client::{
    ActiveJob, BackendError, JobBackend, JobId, JobSnapshot, ScanReport, ScanRequest,
};

/// Configuration for [`HttpScanBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL of the scan service, e.g. `https://scans.example.com`.
    pub base_url: String,
    /// Bearer token attached to every request when present.
    pub api_token: Option<String>,
    /// Per-request timeout. Status polls must stay cheap; keep this short.
    pub request_timeout: Duration,
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// HTTP implementation of the scan platform's capability set.
pub struct HttpScanBackend {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: JobId,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpScanBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Surface a 4xx body as a rejection, forwarding the service message
    /// verbatim where one is provided.
    async fn rejection(response: Response) -> BackendError {
        let status = response.status().as_u16();
        let message = match response.text().await {
            Ok(body) if !body.is_empty() => serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.message)
                .unwrap_or(body),
            _ => format!("the scan service rejected the request (HTTP {status})"),
        };
        BackendError::Rejected { message }
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn transport(err: reqwest::Error) -> BackendError {
    BackendError::Transport(err.to_string())
}

#[async_trait]
impl JobBackend for HttpScanBackend {
    async fn submit(&self, request: &ScanRequest) -> Result<JobId, BackendError> {
        let response = self
            .request(Method::POST, "/api/scans")
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            s if s.is_success() => Ok(Self::decode::<SubmitResponse>(response).await?.id),
            s if s.is_client_error() => Err(Self::rejection(response).await),
            s => Err(BackendError::UnexpectedStatus { status: s.as_u16() }),
        }
    }

    async fn get_status(&self, id: &JobId) -> Result<JobSnapshot, BackendError> {
        let response = self
            .request(Method::GET, &format!("/api/scans/{id}"))
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            s if s.is_success() => Self::decode(response).await,
            s if s.is_client_error() => Err(Self::rejection(response).await),
            s => Err(BackendError::UnexpectedStatus { status: s.as_u16() }),
        }
    }

    async fn get_result(&self, id: &JobId) -> Result<ScanReport, BackendError> {
        let response = self
            .request(Method::GET, &format!("/api/scans/{id}/result"))
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            s if s.is_success() => Self::decode(response).await,
            s if s.is_client_error() => Err(Self::rejection(response).await),
            s => Err(BackendError::UnexpectedStatus { status: s.as_u16() }),
        }
    }

    async fn cancel(&self, id: &JobId) -> Result<(), BackendError> {
        let response = self
            .request(Method::POST, &format!("/api/scans/{id}/cancel"))
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            s if s.is_success() => Ok(()),
            // Already gone or already terminal; cancellation is idempotent.
            s if s == StatusCode::NOT_FOUND || s == StatusCode::CONFLICT => {
                tracing::debug!(job_id = %id, status = s.as_u16(), "cancel raced job completion");
                Ok(())
            }
            s if s.is_client_error() => Err(Self::rejection(response).await),
            s => Err(BackendError::UnexpectedStatus { status: s.as_u16() }),
        }
    }

    async fn get_active_job(&self) -> Result<Option<ActiveJob>, BackendError> {
        let response = self
            .request(Method::GET, "/api/scans/active")
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            s if s == StatusCode::NO_CONTENT || s == StatusCode::NOT_FOUND => Ok(None),
            // 200 with a JSON `null` body also means nothing is running.
            s if s.is_success() => Self::decode::<Option<ActiveJob>>(response).await,
            s if s.is_client_error() => Err(Self::rejection(response).await),
            s => Err(BackendError::UnexpectedStatus { status: s.as_u16() }),
        }
    }
}
