use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::error::{EditorError, ErrorKind, RenderError, Result};

pub type JobId = u64;

/// Lifecycle of a render job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running { frames_done: u64, total_frames: u64 },
    Completed(RenderSummary),
    Failed(JobFailure),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed(_) | JobState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running { .. } => "running",
            JobState::Completed(_) => "completed",
            JobState::Failed(failure) if failure.is_cancelled() => "cancelled",
            JobState::Failed(_) => "failed",
        }
    }
}

/// Why a job ended without output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,

    /// Output frame being produced when the job stopped
    pub frame: Option<u64>,

    /// Pipeline stage that failed (decode, a filter name, encode, ...)
    pub stage: Option<String>,
}

impl JobFailure {
    pub fn from_error(error: &EditorError) -> Self {
        let (frame, stage) = match error {
            EditorError::Render(RenderError::Frame { frame, stage, .. }) => (Some(*frame), Some(stage.clone())),
            EditorError::Render(RenderError::Cancelled { frame, .. }) => (Some(*frame), None),
            _ => (None, None),
        };
        Self {
            kind: error.kind(),
            message: error.to_string(),
            frame,
            stage,
        }
    }

    /// Cancellation is a deliberate stop, not a fault
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of a completed render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderSummary {
    pub job_id: JobId,
    pub output: PathBuf,
    pub frames: u64,

    /// Output duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub has_audio: bool,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Caller's side of a submitted job
///
/// Dropping the handle does not stop the job; call [`JobHandle::cancel`].
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    output: PathBuf,
    submitted_at: DateTime<Utc>,
    state: watch::Receiver<JobState>,
    cancel: Arc<AtomicBool>,
}

impl JobHandle {
    pub(crate) fn new(
        id: JobId,
        output: PathBuf,
        submitted_at: DateTime<Utc>,
        state: watch::Receiver<JobState>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            output,
            submitted_at,
            state,
            cancel,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Current state snapshot
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// Receiver for observing progress updates
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }

    /// Ask the worker to stop before its next frame
    pub fn cancel(&self) {
        if !self.cancel.swap(true, Ordering::AcqRel) {
            info!("Cancellation requested for job {}", self.id);
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Wait for a terminal state
    pub async fn wait(&self) -> JobState {
        let mut rx = self.state.clone();
        let outcome = rx.wait_for(JobState::is_terminal).await.map(|state| state.clone());
        match outcome {
            Ok(state) => state,
            // The worker vanished without publishing a result
            Err(_) => JobState::Failed(JobFailure {
                kind: ErrorKind::EncodeFailure,
                message: format!("render worker for job {} exited unexpectedly", self.id),
                frame: None,
                stage: None,
            }),
        }
    }

    /// Wait and convert the terminal state into a `Result`
    pub async fn result(&self) -> Result<RenderSummary> {
        match self.wait().await {
            JobState::Completed(summary) => Ok(summary),
            JobState::Failed(failure) if failure.is_cancelled() => Err(RenderError::Cancelled {
                job: self.id,
                frame: failure.frame.unwrap_or(0),
            }
            .into()),
            JobState::Failed(failure) => Err(RenderError::JobFailed { job: self.id, failure }.into()),
            // wait() only returns terminal states
            other => Err(RenderError::JobFailed {
                job: self.id,
                failure: JobFailure {
                    kind: ErrorKind::EncodeFailure,
                    message: format!("job ended in non-terminal state '{}'", other.name()),
                    frame: None,
                    stage: None,
                },
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;

    #[test]
    fn test_failure_from_frame_error() {
        let inner: EditorError = MediaError::WriteFailed {
            path: "out.frames".into(),
            reason: "disk full".into(),
        }
        .into();
        let err: EditorError = RenderError::Frame {
            frame: 41,
            stage: "encode".into(),
            source: Box::new(inner),
        }
        .into();

        let failure = JobFailure::from_error(&err);
        assert_eq!(failure.kind, ErrorKind::DiskWriteFailure);
        assert_eq!(failure.frame, Some(41));
        assert_eq!(failure.stage.as_deref(), Some("encode"));
        assert!(!failure.is_cancelled());
    }

    #[test]
    fn test_cancelled_state_name() {
        let err: EditorError = RenderError::Cancelled { job: 3, frame: 9 }.into();
        let state = JobState::Failed(JobFailure::from_error(&err));
        assert!(state.is_terminal());
        assert_eq!(state.name(), "cancelled");
    }

    #[tokio::test]
    async fn test_wait_reports_vanished_worker() {
        let (tx, rx) = watch::channel(JobState::Queued);
        let handle = JobHandle::new(1, PathBuf::from("out.frames"), Utc::now(), rx, Arc::new(AtomicBool::new(false)));
        drop(tx);
        assert!(matches!(handle.wait().await, JobState::Failed(_)));
    }
}
