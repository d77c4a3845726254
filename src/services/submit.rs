//! Job Client: submits one generation job, absorbing the service's
//! rate-limiting contract with a bounded retry budget.
//!
//! A 429 response is flow control, not an error: the client waits out the
//! server-specified (or fallback) delay and tries again, up to
//! `submit_max_attempts` total attempts. Every other non-success status is
//! surfaced immediately.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::TryOnConfig;
use crate::models::job::{JobId, RunResponse};
use crate::models::request::JobRequest;
use crate::services::api::{ApiError, TryOnApi};

/// Sink for human-readable progress text shown by the UI collaborator.
pub type StatusSink = dyn Fn(String) + Send + Sync;

/// How a submission attempt ended when it did not fail.
#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The service accepted the job.
    Submitted(JobId),
    /// Cancellation was requested; no job id was obtained.
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("submission rate limit not lifted after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    #[error("submission rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("run response did not include a job id")]
    MalformedResponse,

    #[error(transparent)]
    Transport(#[from] ApiError),
}

/// Submit a job, retrying through rate limits within the configured budget.
pub async fn submit(
    api: &dyn TryOnApi,
    config: &TryOnConfig,
    request: &JobRequest,
    sink: &StatusSink,
    cancel: &CancellationToken,
) -> Result<SubmitOutcome, SubmitError> {
    let max_attempts = config.submit_max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            tracing::debug!("Submission cancelled before dispatch");
            return Ok(SubmitOutcome::Cancelled);
        }

        let reply = api.run(request).await?;

        if reply.is_rate_limited() {
            if attempt == max_attempts {
                tracing::warn!(attempts = max_attempts, "Submission retry budget exhausted");
                return Err(SubmitError::RateLimitExhausted { attempts: max_attempts });
            }

            let wait = Duration::from_secs(
                reply.retry_after.unwrap_or(config.submit_retry_fallback_secs),
            );
            tracing::info!(
                attempt,
                wait_secs = wait.as_secs(),
                "Submission rate limited, backing off"
            );
            sink(format!("Service busy, waiting {}s", wait.as_secs()));

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Submission cancelled during backoff");
                    return Ok(SubmitOutcome::Cancelled);
                }
                _ = tokio::time::sleep(wait) => {}
            }
            continue;
        }

        if !reply.is_success() {
            return Err(SubmitError::Rejected {
                status: reply.status,
                body: reply.body,
            });
        }

        let parsed: RunResponse =
            serde_json::from_str(&reply.body).map_err(|_| SubmitError::MalformedResponse)?;
        let id = parsed.id.ok_or(SubmitError::MalformedResponse)?;

        tracing::info!(job_id = %id, attempt, "Job submitted");
        return Ok(SubmitOutcome::Submitted(id));
    }

    Err(SubmitError::RateLimitExhausted { attempts: max_attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::models::image::EncodedImage;
    use crate::models::request::{Category, RunMode};
    use crate::services::api::testing::{ok_json, rate_limited, rejected, ScriptedApi};

    fn request() -> JobRequest {
        let img = EncodedImage::from_bytes("image/png", b"x");
        JobRequest::new("tryon-v1.6", img.clone(), img, Category::Auto, RunMode::Balanced, 1)
    }

    fn silent_sink() -> Box<StatusSink> {
        Box::new(|_| {})
    }

    #[tokio::test]
    async fn first_attempt_success_returns_id() {
        let api = ScriptedApi::new();
        api.push_run(ok_json(r#"{"id":"job-42"}"#));

        let outcome = submit(&api, &TryOnConfig::default(), &request(), &silent_sink(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, SubmitOutcome::Submitted(JobId::from("job-42")));
        assert_eq!(api.run_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_header_sets_the_exact_wait() {
        let api = ScriptedApi::new();
        api.push_run(rate_limited(Some(5)));
        api.push_run(ok_json(r#"{"id":"job-a"}"#));

        let start = tokio::time::Instant::now();
        let outcome = submit(&api, &TryOnConfig::default(), &request(), &silent_sink(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, SubmitOutcome::Submitted(JobId::from("job-a")));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(api.run_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_retry_after_uses_the_fallback() {
        let api = ScriptedApi::new();
        api.push_run(rate_limited(None));
        api.push_run(ok_json(r#"{"id":"job-b"}"#));

        let start = tokio::time::Instant::now();
        submit(&api, &TryOnConfig::default(), &request(), &silent_sink(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_stops_retrying() {
        let api = ScriptedApi::new();
        api.push_run(rate_limited(Some(1)));
        api.push_run(rate_limited(Some(1)));
        api.push_run(rate_limited(Some(1)));

        let err = submit(&api, &TryOnConfig::default(), &request(), &silent_sink(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::RateLimitExhausted { attempts: 3 }));
        // Exactly three attempts, and no wait after the final 429.
        assert_eq!(api.run_count(), 3);
    }

    #[tokio::test]
    async fn non_rate_limit_rejection_is_not_retried() {
        let api = ScriptedApi::new();
        api.push_run(rejected(500, "upstream exploded"));

        let err = submit(&api, &TryOnConfig::default(), &request(), &silent_sink(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            SubmitError::Rejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(api.run_count(), 1);
    }

    #[tokio::test]
    async fn success_without_id_is_malformed() {
        let api = ScriptedApi::new();
        api.push_run(ok_json(r#"{"error":"quota"}"#));

        let err = submit(&api, &TryOnConfig::default(), &request(), &silent_sink(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::MalformedResponse));
    }

    #[tokio::test]
    async fn cancelled_before_dispatch_sends_nothing() {
        let api = ScriptedApi::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = submit(&api, &TryOnConfig::default(), &request(), &silent_sink(), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, SubmitOutcome::Cancelled);
        assert_eq!(api.run_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_during_backoff_exits_quietly() {
        let api = Arc::new(ScriptedApi::new());
        api.push_run(rate_limited(Some(30)));

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let outcome = submit(
            api.as_ref(),
            &TryOnConfig::default(),
            &request(),
            &silent_sink(),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(outcome, SubmitOutcome::Cancelled);
        assert_eq!(api.run_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_reports_status_text() {
        let api = ScriptedApi::new();
        api.push_run(rate_limited(Some(5)));
        api.push_run(ok_json(r#"{"id":"job-c"}"#));

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: Box<StatusSink> = Box::new(move |msg| sink_seen.lock().unwrap().push(msg));

        submit(&api, &TryOnConfig::default(), &request(), &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), ["Service busy, waiting 5s"]);
    }
}
