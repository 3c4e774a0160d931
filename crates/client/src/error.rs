// crates/client/src/error.rs
use thiserror::Error;

use crate::backend::BackendError;
use crate::client::JobPhase;

/// Errors surfaced to consumers of [`RemoteJobClient`].
///
/// Transient poll failures never appear here; they are logged and retried
/// inside the poll loop. Job failure is a terminal outcome delivered through
/// the observer, not an error from a client method.
///
/// [`RemoteJobClient`]: crate::client::RemoteJobClient
#[derive(Debug, Error)]
pub enum ClientError {
    /// The submission was refused, either locally (a job is already active
    /// on this client) or by the backend (validation, conflict, auth).
    #[error("submission rejected: {message}")]
    SubmissionRejected { message: String },

    /// `cancel()` was invoked while no job was running. Benign.
    #[error("no running job to cancel")]
    CancellationIgnored,

    /// `fetch_result()` was called before the job completed.
    #[error("result not available while the job is {phase}")]
    ResultUnavailable { phase: JobPhase },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ClientError {
    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Self::SubmissionRejected {
            message: message.into(),
        }
    }
}
