// crates/client/src/backend.rs
//! JobBackend trait: the capability set consumed from the scan platform.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ActiveJob, JobId, JobSnapshot, ScanReport, ScanRequest};

/// Errors surfaced by a [`JobBackend`] implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend refused the request (validation, conflict with an active
    /// job, auth). The message is forwarded verbatim where the backend
    /// provides one.
    #[error("backend rejected the request: {message}")]
    Rejected { message: String },

    /// Connect, timeout, or mid-flight transport failure. Transient from the
    /// poll loop's perspective.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The response body did not match the wire contract.
    #[error("could not decode backend response: {0}")]
    Decode(String),

    #[error("unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16 },
}

/// Backend capability set for one owning principal.
///
/// The backend enforces at most one running scan per principal; clients are
/// expected to rediscover that scan via [`get_active_job`] rather than submit
/// a second one.
///
/// [`get_active_job`]: JobBackend::get_active_job
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Create a scan job. Fails with [`BackendError::Rejected`] on validation
    /// errors or when a scan is already active server-side.
    async fn submit(&self, request: &ScanRequest) -> Result<JobId, BackendError>;

    /// Fetch the current status snapshot for a job.
    async fn get_status(&self, id: &JobId) -> Result<JobSnapshot, BackendError>;

    /// Fetch the full report. Callable once the job has completed.
    async fn get_result(&self, id: &JobId) -> Result<ScanReport, BackendError>;

    /// Request cancellation. Best-effort and idempotent: a job that already
    /// reached a terminal state is not an error.
    async fn cancel(&self, id: &JobId) -> Result<(), BackendError>;

    /// The running scan owned by this principal, if any. Used for startup
    /// resumption.
    async fn get_active_job(&self) -> Result<Option<ActiveJob>, BackendError>;
}
