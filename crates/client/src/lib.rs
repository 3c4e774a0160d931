// crates/client/src/lib.rs
//! Core client for long-running repository-scan jobs.
//!
//! [`RemoteJobClient`] drives one server-tracked scan through its lifecycle:
//! submission, fixed-interval status polling, cooperative cancellation, and
//! resumption of a scan that outlived the process that submitted it. The
//! backend is abstract ([`JobBackend`]): `codetrace-http` provides the REST
//! implementation, tests use scripted in-memory ones.

pub mod backend;
pub mod client;
pub mod error;
pub mod observer;
pub mod poll;
pub mod types;

pub use backend::{BackendError, JobBackend};
pub use client::{JobHandle, JobPhase, RemoteJobClient};
pub use error::ClientError;
pub use observer::{JobObserver, NoopObserver};
pub use poll::{next_delay, PollConfig, DEFAULT_POLL_INTERVAL};
pub use types::{
    ActiveJob, Finding, JobId, JobOutcome, JobSnapshot, JobStatus, ScanReport, ScanRequest,
    ScanSummary,
};
