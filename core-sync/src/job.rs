//! # Background Jobs
//!
//! Full rescans and saves run on background tasks. Each one is tracked by a
//! [`Job`] record with validated state transitions and exposed to callers as
//! a [`JobHandle`] supporting `cancel()` and `join()`.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓
//!     └──────→ Failed
//!     └──────→ Cancelled
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let handle = engine.start_full_rescan("include directories changed").await?;
//!
//! // A newer request supersedes this one...
//! handle.cancel();
//!
//! // ...or wait for the outcome.
//! match handle.join().await? {
//!     RescanOutcome::Completed { files, .. } => println!("{} files", files),
//!     RescanOutcome::Cancelled { .. } => println!("rescan still owed"),
//!     RescanOutcome::Failed { message } => eprintln!("{}", message),
//! }
//! ```

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    FullRescan,
    Save,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::FullRescan => "full_rescan",
            JobKind::Save => "save",
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// How a full rescan ended. Cancellation is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescanOutcome {
    Completed {
        files: usize,
        verification_code: String,
    },
    /// Stopped early; the previous file set was kept and a rescan is owed.
    Cancelled { files_processed: usize },
    /// The walk failed; the previous file set was kept and a rescan is owed.
    Failed { message: String },
}

impl RescanOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            RescanOutcome::Completed { .. } => JobStatus::Completed,
            RescanOutcome::Cancelled { .. } => JobStatus::Cancelled,
            RescanOutcome::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RescanOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { path: PathBuf },
    /// Cancelled before the write started; nothing was written.
    Cancelled,
    Failed { message: String },
}

impl SaveOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            SaveOutcome::Saved { .. } => JobStatus::Completed,
            SaveOutcome::Cancelled => JobStatus::Cancelled,
            SaveOutcome::Failed { .. } => JobStatus::Failed,
        }
    }
}

// ============================================================================
// Job Entity
// ============================================================================

/// Bookkeeping for one background job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub project: String,
    pub status: JobStatus,
    /// Why the job was scheduled
    pub reason: String,
    pub files_processed: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(kind: JobKind, project: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_id(JobId::new(), kind, project, reason)
    }

    pub fn with_id(
        id: JobId,
        kind: JobKind,
        project: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind,
            project: project.into(),
            status: JobStatus::Pending,
            reason: reason.into(),
            files_processed: 0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the job is not `Pending`.
    pub fn start(mut self) -> Result<Self> {
        self.validate_transition(JobStatus::Running)?;
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(self)
    }

    pub fn record_progress(&mut self, files_processed: u64) -> Result<()> {
        if self.status != JobStatus::Running {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: "record_progress".to_string(),
                reason: "Job must be running to record progress".to_string(),
            });
        }
        self.files_processed = files_processed;
        Ok(())
    }

    pub fn complete(mut self) -> Result<Self> {
        self.validate_transition(JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(self)
    }

    pub fn fail(mut self, message: impl Into<String>) -> Result<Self> {
        self.validate_transition(JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(message.into());
        Ok(self)
    }

    pub fn cancel(mut self) -> Result<Self> {
        self.validate_transition(JobStatus::Cancelled)?;
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        Ok(self)
    }

    /// Wall time between start and completion, in milliseconds.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }

    fn validate_transition(&self, to: JobStatus) -> Result<()> {
        let valid = match (self.status, to) {
            // From Pending
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Pending, JobStatus::Cancelled) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,

            // From Running
            (JobStatus::Running, JobStatus::Completed) => true,
            (JobStatus::Running, JobStatus::Failed) => true,
            (JobStatus::Running, JobStatus::Cancelled) => true,

            // Terminal states cannot transition
            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Caller side of a background job.
///
/// Clones share the same job; cancelling through any clone cancels it.
#[derive(Debug, Clone)]
pub struct JobHandle<R> {
    id: JobId,
    kind: JobKind,
    token: CancellationToken,
    outcome: watch::Receiver<Option<R>>,
}

/// Task side of a background job; publishes the outcome exactly once.
#[derive(Debug)]
pub(crate) struct JobCompleter<R> {
    sender: watch::Sender<Option<R>>,
}

impl<R> JobCompleter<R> {
    pub(crate) fn finish(self, outcome: R) {
        // Nobody listening is fine; the handle may have been dropped.
        let _ = self.sender.send(Some(outcome));
    }
}

pub(crate) fn job_channel<R>(id: JobId, kind: JobKind) -> (JobHandle<R>, JobCompleter<R>) {
    let (sender, outcome) = watch::channel(None);
    (
        JobHandle {
            id,
            kind,
            token: CancellationToken::new(),
            outcome,
        },
        JobCompleter { sender },
    )
}

impl<R: Clone> JobHandle<R> {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Outcome if the job already finished.
    pub fn try_outcome(&self) -> Option<R> {
        self.outcome.borrow().clone()
    }

    /// Wait for the job to finish.
    ///
    /// # Errors
    ///
    /// [`SyncError::JobAborted`] when the task ended without publishing an
    /// outcome (for example, it panicked).
    pub async fn join(&self) -> Result<R> {
        let mut outcome = self.outcome.clone();
        loop {
            if let Some(result) = outcome.borrow_and_update().clone() {
                return Ok(result);
            }
            if outcome.changed().await.is_err() {
                return outcome
                    .borrow()
                    .clone()
                    .ok_or_else(|| SyncError::JobAborted(self.id.to_string()));
            }
        }
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_display() {
        assert_eq!(JobStatus::Running.to_string(), "running");
        assert_eq!(JobStatus::Cancelled.to_string(), "cancelled");
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_job_lifecycle() {
        let job = Job::new(JobKind::FullRescan, "demo", "initial scan");
        assert_eq!(job.status, JobStatus::Pending);

        let mut job = job.start().unwrap();
        job.record_progress(5).unwrap();
        let job = job.complete().unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.files_processed, 5);
        assert!(job.duration_ms().is_some());
    }

    #[test]
    fn test_terminal_job_rejects_transitions() {
        let job = Job::new(JobKind::FullRescan, "demo", "x")
            .start()
            .unwrap()
            .cancel()
            .unwrap();

        assert!(job.clone().complete().is_err());
        assert!(job.clone().fail("late").is_err());
        assert!(job.start().is_err());
    }

    #[test]
    fn test_progress_requires_running() {
        let mut job = Job::new(JobKind::Save, "demo", "x");
        assert!(matches!(
            job.record_progress(1),
            Err(SyncError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_join_returns_published_outcome() {
        let (handle, completer) = job_channel::<RescanOutcome>(JobId::new(), JobKind::FullRescan);
        let waiter = handle.clone();

        let join = tokio::spawn(async move { waiter.join().await });
        completer.finish(RescanOutcome::Cancelled { files_processed: 3 });

        let outcome = join.await.unwrap().unwrap();
        assert_eq!(outcome, RescanOutcome::Cancelled { files_processed: 3 });
        assert!(handle.is_finished());
        assert_eq!(handle.try_outcome(), Some(outcome));
    }

    #[tokio::test]
    async fn test_join_after_dropped_completer_is_aborted() {
        let (handle, completer) = job_channel::<SaveOutcome>(JobId::new(), JobKind::Save);
        drop(completer);

        assert!(matches!(handle.join().await, Err(SyncError::JobAborted(_))));
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let (handle, _completer) = job_channel::<RescanOutcome>(JobId::new(), JobKind::FullRescan);
        let other = handle.clone();

        other.cancel();

        assert!(handle.is_cancelled());
        assert!(handle.token().is_cancelled());
    }
}
