//! Poll Loop: drives one submitted job to a terminal state.
//!
//! Each tick checks, in order: cooperative cancellation, whether this
//! handle is still the widget's active job, and the global deadline. Only
//! then is a status request issued. Rate-limited ticks wait out the
//! server's delay and widen the polling interval; they never fail the job.

use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::TryOnConfig;
use crate::models::job::{JobId, JobStatus, StatusResponse};
use crate::services::api::{ApiError, TryOnApi};
use crate::services::submit::StatusSink;

/// The widget's single authoritative "current job" cell.
///
/// The controller owns and mutates it; poll loops only read it, comparing
/// against the handle they were started with. A mismatch means the loop
/// has been superseded by a newer run and must exit without reporting.
#[derive(Debug, Default)]
pub struct ActiveJob(Mutex<Option<JobId>>);

impl ActiveJob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: JobId) {
        *self.0.lock().unwrap() = Some(id);
    }

    pub fn clear(&self) {
        *self.0.lock().unwrap() = None;
    }

    /// Clear only if `id` is still the active job; a superseding run's
    /// handle is left untouched.
    pub fn clear_if(&self, id: &JobId) {
        let mut current = self.0.lock().unwrap();
        if current.as_ref() == Some(id) {
            *current = None;
        }
    }

    pub fn current(&self) -> Option<JobId> {
        self.0.lock().unwrap().clone()
    }

    pub fn is_current(&self, id: &JobId) -> bool {
        self.0.lock().unwrap().as_ref() == Some(id)
    }
}

/// How a poll loop ended when it did not fail.
///
/// `Cancelled` and `Superseded` are silent exits: the caller must not
/// surface them to the UI as errors or results.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Terminal success with the ordered result image URLs (may be empty).
    Completed(Vec<String>),
    /// The cancellation flag was set.
    Cancelled,
    /// A newer run replaced this handle.
    Superseded,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("status check failed (HTTP {status}): {body}")]
    StatusCheck { status: u16, body: String },

    #[error("generation failed: {0}")]
    JobFailed(String),

    #[error("generation did not finish within the timeout")]
    Timeout,

    #[error("status response was not understood")]
    MalformedResponse,

    #[error(transparent)]
    Transport(#[from] ApiError),
}

/// Poll a job until it completes, fails, times out, is cancelled, or is
/// superseded by a newer run.
pub async fn poll(
    api: &dyn TryOnApi,
    config: &TryOnConfig,
    job_id: &JobId,
    active: &ActiveJob,
    sink: &StatusSink,
    cancel: &CancellationToken,
) -> Result<PollOutcome, PollError> {
    let deadline = config.poll_timeout();
    let start = tokio::time::Instant::now();
    let mut interval = config.poll_base_interval();

    loop {
        if cancel.is_cancelled() {
            tracing::debug!(job_id = %job_id, "Poll loop cancelled");
            return Ok(PollOutcome::Cancelled);
        }
        if !active.is_current(job_id) {
            tracing::debug!(job_id = %job_id, "Poll loop superseded by a newer run");
            return Ok(PollOutcome::Superseded);
        }
        if start.elapsed() >= deadline {
            tracing::warn!(job_id = %job_id, timeout_secs = deadline.as_secs(), "Poll timed out");
            return Err(PollError::Timeout);
        }

        let reply = api.status(job_id).await?;

        if reply.is_rate_limited() {
            let wait = Duration::from_secs(
                reply.retry_after.unwrap_or(config.poll_retry_fallback_secs),
            );
            tracing::debug!(
                job_id = %job_id,
                wait_secs = wait.as_secs(),
                "Status check rate limited"
            );
            sink(format!("Rate limited, waiting ~{}s", wait.as_secs()));
            interval = grow(interval, config);

            tokio::select! {
                _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
            continue;
        }

        if !reply.is_success() {
            return Err(PollError::StatusCheck {
                status: reply.status,
                body: reply.body,
            });
        }

        let parsed: StatusResponse =
            serde_json::from_str(&reply.body).map_err(|_| PollError::MalformedResponse)?;

        match parsed.status {
            JobStatus::Completed => {
                let output = parsed.output.unwrap_or_default();
                tracing::info!(job_id = %job_id, results = output.len(), "Job completed");
                return Ok(PollOutcome::Completed(output));
            }
            JobStatus::Failed => {
                let message = parsed
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "generation failed".to_string());
                return Err(PollError::JobFailed(message));
            }
            status @ (JobStatus::Queued | JobStatus::Running) => {
                sink(format!("Status: {status}"));

                tokio::select! {
                    _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                    _ = tokio::time::sleep(interval) => {}
                }
                interval = grow(interval, config);
            }
        }
    }
}

fn grow(interval: Duration, config: &TryOnConfig) -> Duration {
    (interval + config.poll_interval_step()).min(config.poll_max_interval())
}
