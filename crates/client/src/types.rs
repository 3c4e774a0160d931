// crates/client/src/types.rs
//! Job identifiers, status snapshots, and scan payload types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier for a server-tracked scan job.
///
/// Assigned by the backend on submission; the client never fabricates one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-reported status of a scan job.
///
/// `Queued`, `Cloning`, and `Scanning` are the working states; the rest are
/// terminal and end the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Cloning,
    Scanning,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One polled status observation.
///
/// Progress fields are advisory display state, not authoritative: the backend
/// owns the job, the snapshot just mirrors it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: JobStatus,

    /// 0–100. Delivered snapshots never regress (see the poll loop).
    #[serde(default)]
    pub progress_percent: u8,

    /// Free-text label of the current work unit, e.g. the file being scanned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_description: Option<String>,

    #[serde(default)]
    pub findings_so_far: u64,

    /// Present only when `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Submission input for a repository scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub repository_owner: String,
    pub repository_name: String,

    /// Branch, tag, or commit to scan. Backend default branch when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

impl ScanRequest {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            repository_owner: owner.into(),
            repository_name: name.into(),
            git_ref: None,
        }
    }

    pub fn with_git_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    /// `owner/name` display form.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.repository_owner, self.repository_name)
    }
}

/// A running scan discovered via `get_active_job`.
///
/// Carries the original request parameters so a consumer can rebuild its
/// display after a restart, when local state may no longer exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveJob {
    pub id: JobId,
    pub repository_owner: String,
    pub repository_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl ActiveJob {
    /// `owner/name` display form.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.repository_owner, self.repository_name)
    }
}

/// Terminal result payload, fetched separately by id once a scan completes.
///
/// Kept off the status-poll path so polling stays cheap even for large
/// reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub summary: ScanSummary,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_findings: u64,
    pub files_scanned: u64,
}

/// One flagged location in the scanned repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub path: String,
    pub line: u32,
    /// 0.0–1.0 detector confidence.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
}

/// Final resolution of one job lifecycle.
///
/// `Cancelled` is a distinct outcome, not an error: consumers reset silently
/// instead of showing a failure banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed { message: String },
    Cancelled,
}
