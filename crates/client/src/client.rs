// crates/client/src/client.rs
//! RemoteJobClient drives one scan job through submit/poll/cancel/resume.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{BackendError, JobBackend};
use crate::error::ClientError;
use crate::observer::{JobObserver, NoopObserver};
use crate::poll::{next_delay, PollConfig};
use crate::types::{ActiveJob, JobId, JobOutcome, JobSnapshot, JobStatus, ScanReport, ScanRequest};

/// Client-side lifecycle phase.
///
/// `Idle → Submitting → Running → {Completed|Failed|Cancelled}`. A terminal
/// phase never transitions further within one lifecycle; a fresh submission
/// starts the next lifecycle from `Idle` or any terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobPhase {
    Idle = 0,
    Submitting = 1,
    Running = 2,
    Completed = 3,
    Failed = 4,
    Cancelled = 5,
}

impl JobPhase {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Idle),
            1 => Some(Self::Submitting),
            2 => Some(Self::Running),
            3 => Some(Self::Completed),
            4 => Some(Self::Failed),
            5 => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Handle to one submitted or resumed job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    done: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Wait for the lifecycle to resolve. Returns the same outcome delivered
    /// to `on_terminal`.
    pub async fn wait(self) -> JobOutcome {
        // The sender only drops unsent if the runtime tears the poll task
        // down mid-lifecycle (shutdown). Treat that as cancellation.
        self.done.await.unwrap_or(JobOutcome::Cancelled)
    }
}

/// Shared lifecycle state between the client, the poll task, and `cancel()`.
struct Inner {
    phase: AtomicU8,
    job_id: Mutex<Option<JobId>>,
    /// Token scoped to the current submission; replaced (and the previous one
    /// invalidated) each time a new lifecycle starts.
    token: Mutex<CancellationToken>,
    /// Consumed exactly once per lifecycle when the terminal outcome is
    /// delivered, by whichever of {poll task, cancel, failed submission} wins.
    terminal_tx: Mutex<Option<oneshot::Sender<JobOutcome>>>,
    /// Serializes progress delivery against `cancel()`: cancel acquires this
    /// after invalidating the token, so any `on_progress` already past its
    /// token check finishes before `cancel()` returns, and none start after.
    delivery: Mutex<()>,
}

impl Inner {
    fn new() -> Self {
        Self {
            phase: AtomicU8::new(JobPhase::Idle as u8),
            job_id: Mutex::new(None),
            token: Mutex::new(CancellationToken::new()),
            terminal_tx: Mutex::new(None),
            delivery: Mutex::new(()),
        }
    }

    fn phase(&self) -> JobPhase {
        JobPhase::from_u8(self.phase.load(Ordering::Acquire)).unwrap_or(JobPhase::Failed)
    }

    fn store_phase(&self, phase: JobPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Resolve `Running` into a terminal phase. Returns false if another path
    /// (usually `cancel()`) already resolved this lifecycle.
    fn try_terminal(&self, phase: JobPhase) -> bool {
        self.phase
            .compare_exchange(
                JobPhase::Running as u8,
                phase as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Delivers the terminal notification at most once per lifecycle.
fn deliver_terminal(inner: &Inner, observer: &dyn JobObserver, outcome: JobOutcome) {
    let tx = match inner.terminal_tx.lock() {
        Ok(mut guard) => guard.take(),
        Err(e) => {
            tracing::error!("terminal channel lock poisoned: {e}");
            None
        }
    };
    if let Some(tx) = tx {
        observer.on_terminal(&outcome);
        let _ = tx.send(outcome);
    }
}

/// Drives a single long-running scan job on behalf of a consumer.
///
/// One client owns at most one running job at a time, mirroring the backend's
/// one-active-scan-per-principal rule: `submit` and `resume` are rejected
/// while a lifecycle is in flight, without contacting the backend.
///
/// The client never panics out of a lifecycle: every failure path resolves
/// to a terminal phase plus an observer notification, leaving the consumer in
/// control of retry (reset happens implicitly with the next `submit`).
pub struct RemoteJobClient {
    backend: Arc<dyn JobBackend>,
    observer: Arc<dyn JobObserver>,
    config: PollConfig,
    inner: Arc<Inner>,
}

impl RemoteJobClient {
    pub fn new(backend: Arc<dyn JobBackend>) -> Self {
        Self {
            backend,
            observer: Arc::new(NoopObserver),
            config: PollConfig::default(),
            inner: Arc::new(Inner::new()),
        }
    }

    /// Attach a progress/terminal observer.
    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Override the poll loop tuning.
    pub fn with_poll_config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }

    pub fn phase(&self) -> JobPhase {
        self.inner.phase()
    }

    /// The id bound to the current lifecycle, if one has been assigned.
    pub fn job_id(&self) -> Option<JobId> {
        self.inner.job_id.lock().ok().and_then(|g| g.clone())
    }

    /// Submit a new scan and start polling it.
    ///
    /// Rejected without a backend call while a job is already submitting or
    /// running on this client. A backend refusal or transport failure during
    /// submission resolves the lifecycle as failed; polling never starts.
    pub async fn submit(&self, request: &ScanRequest) -> Result<JobHandle, ClientError> {
        let (done, token) = self.begin_lifecycle(JobPhase::Submitting, None)?;
        info!(repository = %request.slug(), "submitting scan");

        let id = match self.backend.submit(request).await {
            Ok(id) => id,
            Err(err) => {
                let message = match &err {
                    BackendError::Rejected { message } => message.clone(),
                    other => other.to_string(),
                };
                warn!(error = %err, "scan submission failed");
                self.inner.store_phase(JobPhase::Failed);
                deliver_terminal(
                    &self.inner,
                    self.observer.as_ref(),
                    JobOutcome::Failed {
                        message: message.clone(),
                    },
                );
                return Err(ClientError::rejected(message));
            }
        };

        if let Ok(mut guard) = self.inner.job_id.lock() {
            *guard = Some(id.clone());
        }
        self.inner.store_phase(JobPhase::Running);
        info!(job_id = %id, "scan accepted, polling for status");
        self.spawn_poll_loop(id.clone(), token);
        Ok(JobHandle { id, done })
    }

    /// Reattach to a job already running server-side, skipping submission.
    ///
    /// The caller confirms existence first (via `get_active_job`); this
    /// method binds the id straight into `Running` and starts the poll loop.
    pub fn resume(&self, active: &ActiveJob) -> Result<JobHandle, ClientError> {
        let (done, token) =
            self.begin_lifecycle(JobPhase::Running, Some(active.id.clone()))?;
        info!(job_id = %active.id, repository = %active.slug(), "resuming active scan");
        self.spawn_poll_loop(active.id.clone(), token);
        Ok(JobHandle {
            id: active.id.clone(),
            done,
        })
    }

    /// Startup discovery: query the backend for a surviving scan and resume
    /// it. Returns `None` (still idle) when nothing is running.
    pub async fn resume_active(&self) -> Result<Option<(ActiveJob, JobHandle)>, ClientError> {
        match self.backend.get_active_job().await? {
            Some(active) => {
                let handle = self.resume(&active)?;
                Ok(Some((active, handle)))
            }
            None => Ok(None),
        }
    }

    /// Cancel the running job.
    ///
    /// The client-side lifecycle resolves to `Cancelled` before this method
    /// returns, and no progress notification is delivered afterwards, even
    /// for a status response still in flight. The backend notification is
    /// fire-and-forget: a job that already finished server-side is fine.
    pub fn cancel(&self) -> Result<(), ClientError> {
        // The phase flip and the token invalidation happen under the same
        // lock as the claim in `begin_lifecycle`, so the token cancelled here
        // is always the one belonging to the lifecycle whose flip we won.
        {
            let token_slot = self
                .inner
                .token
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !self.inner.try_terminal(JobPhase::Cancelled) {
                return Err(ClientError::CancellationIgnored);
            }
            token_slot.cancel();
        }

        // Wait out any progress delivery already past its token check.
        drop(self.inner.delivery.lock());

        deliver_terminal(&self.inner, self.observer.as_ref(), JobOutcome::Cancelled);

        if let Some(id) = self.job_id() {
            let backend = Arc::clone(&self.backend);
            tokio::spawn(async move {
                if let Err(err) = backend.cancel(&id).await {
                    tracing::debug!(job_id = %id, error = %err, "best-effort backend cancel failed");
                }
            });
        }
        info!("scan cancelled");
        Ok(())
    }

    /// Fetch the full report for the completed job.
    pub async fn fetch_result(&self) -> Result<ScanReport, ClientError> {
        let phase = self.phase();
        if phase != JobPhase::Completed {
            return Err(ClientError::ResultUnavailable { phase });
        }
        let id = self
            .job_id()
            .ok_or(ClientError::ResultUnavailable { phase })?;
        Ok(self.backend.get_result(&id).await?)
    }

    /// Claim the client for a new lifecycle: guard against a second active
    /// job, invalidate the previous token, bind the job id when it is already
    /// known (resume), and arm a fresh terminal channel.
    fn begin_lifecycle(
        &self,
        target: JobPhase,
        bind_id: Option<JobId>,
    ) -> Result<(oneshot::Receiver<JobOutcome>, CancellationToken), ClientError> {
        // Everything here runs under the token slot lock so `cancel()` cannot
        // slip between the phase claim and the token/channel swap.
        let mut token_slot = self
            .inner
            .token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        loop {
            let current = self.inner.phase.load(Ordering::Acquire);
            let phase = JobPhase::from_u8(current).unwrap_or(JobPhase::Failed);
            if matches!(phase, JobPhase::Submitting | JobPhase::Running) {
                return Err(ClientError::rejected(
                    "a scan is already active on this client",
                ));
            }
            if self
                .inner
                .phase
                .compare_exchange(current, target as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        let token = CancellationToken::new();
        token_slot.cancel();
        *token_slot = token.clone();

        if let Ok(mut guard) = self.inner.job_id.lock() {
            *guard = bind_id;
        }

        let (tx, rx) = oneshot::channel();
        if let Ok(mut guard) = self.inner.terminal_tx.lock() {
            *guard = Some(tx);
        }
        drop(token_slot);
        Ok((rx, token))
    }

    fn spawn_poll_loop(&self, id: JobId, token: CancellationToken) {
        let inner = Arc::clone(&self.inner);
        let backend = Arc::clone(&self.backend);
        let observer = Arc::clone(&self.observer);
        let config = self.config.clone();
        tokio::spawn(poll_loop(inner, backend, observer, config, id, token));
    }
}

/// The poll loop: fetch status, deliver progress, repeat until terminal.
///
/// The first fetch happens immediately; subsequent ticks are spaced by
/// [`next_delay`]. Every await races the cancellation token so the loop winds
/// down promptly, and a response that lands after invalidation is discarded
/// before any callback.
async fn poll_loop(
    inner: Arc<Inner>,
    backend: Arc<dyn JobBackend>,
    observer: Arc<dyn JobObserver>,
    config: PollConfig,
    id: JobId,
    token: CancellationToken,
) {
    let mut consecutive_failures: u32 = 0;
    let mut max_percent: u8 = 0;
    let mut max_findings: u64 = 0;
    let mut last: Option<JobSnapshot> = None;

    loop {
        let snapshot = tokio::select! {
            _ = token.cancelled() => return,
            result = backend.get_status(&id) => match result {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    // A fetch error racing a cancellation belongs to a dead
                    // lifecycle; it must not fail a successor.
                    if token.is_cancelled() {
                        return;
                    }
                    consecutive_failures += 1;
                    warn!(
                        job_id = %id,
                        attempt = consecutive_failures,
                        error = %err,
                        "status poll failed, will retry"
                    );
                    if let Some(budget) = config.max_consecutive_failures {
                        if consecutive_failures >= budget {
                            if inner.try_terminal(JobPhase::Failed) {
                                deliver_terminal(
                                    &inner,
                                    observer.as_ref(),
                                    JobOutcome::Failed {
                                        message: format!(
                                            "status polling failed {consecutive_failures} times in a row: {err}"
                                        ),
                                    },
                                );
                            }
                            return;
                        }
                    }
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(next_delay(&config, last.as_ref())) => {}
                    }
                    continue;
                }
            },
        };
        consecutive_failures = 0;

        // A response that raced a cancellation must not resurrect the job.
        if token.is_cancelled() {
            return;
        }

        match snapshot.status {
            JobStatus::Completed => {
                if inner.try_terminal(JobPhase::Completed) {
                    info!(job_id = %id, findings = snapshot.findings_so_far, "scan completed");
                    deliver_terminal(&inner, observer.as_ref(), JobOutcome::Completed);
                }
                return;
            }
            JobStatus::Failed => {
                if inner.try_terminal(JobPhase::Failed) {
                    let message = snapshot
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "scan failed without a reported reason".to_string());
                    warn!(job_id = %id, error = %message, "scan failed");
                    deliver_terminal(&inner, observer.as_ref(), JobOutcome::Failed { message });
                }
                return;
            }
            JobStatus::Cancelled => {
                // Cancelled from another seat; resolve the same way.
                if inner.try_terminal(JobPhase::Cancelled) {
                    info!(job_id = %id, "scan cancelled server-side");
                    deliver_terminal(&inner, observer.as_ref(), JobOutcome::Cancelled);
                }
                return;
            }
            JobStatus::Queued | JobStatus::Cloning | JobStatus::Scanning => {
                match inner.delivery.lock() {
                    Ok(_guard) => {
                        if token.is_cancelled() {
                            return;
                        }
                        // Clamp to running maxima: the transport may reorder
                        // intermediate responses, progress display must not.
                        max_percent = max_percent.max(snapshot.progress_percent);
                        max_findings = max_findings.max(snapshot.findings_so_far);
                        let mut delivered = snapshot;
                        delivered.progress_percent = max_percent;
                        delivered.findings_so_far = max_findings;
                        observer.on_progress(&delivered);
                        last = Some(delivered);
                    }
                    Err(e) => {
                        tracing::error!("delivery lock poisoned: {e}");
                        return;
                    }
                }
            }
        }

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(next_delay(&config, last.as_ref())) => {}
        }
    }
}
