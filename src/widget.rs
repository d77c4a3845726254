//! Widget Controller: mediates user intent into orchestrator state.
//!
//! The controller owns everything a single try-on widget instance needs:
//! the garment reference fixed at `open`, the shopper's prepared photo, the
//! authoritative current-job cell, the cancellation token, and the
//! observable UI state. It is the only layer that turns failures into
//! user-visible messages; everything below it surfaces typed errors.
//!
//! Single-flight is enforced by supersession rather than force-kill: a new
//! `run` installs its job id in the [`ActiveJob`] cell and any older poll
//! loop exits on its own at the next staleness check.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use garde::Validate;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::TryOnConfig;
use crate::models::image::{EncodedImage, ImageSource};
use crate::models::job::JobId;
use crate::models::request::{Category, GarmentPhotoType, JobRequest, RunMode};
use crate::services::api::TryOnApi;
use crate::services::poll::{poll, ActiveJob, PollError, PollOutcome};
use crate::services::prepare::{prepare, PrepareError};
use crate::services::session::{ResumableSession, SessionStore};
use crate::services::submit::{submit, StatusSink, SubmitError, SubmitOutcome};

/// Where the widget currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WidgetPhase {
    #[default]
    Idle,
    Preparing,
    Submitting,
    Polling,
    Succeeded,
    Failed,
}

/// Observable UI state. Cloned out on every `state()` call; at most one
/// error message is set at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct WidgetState {
    pub phase: WidgetPhase,
    pub loading: bool,
    pub status_text: Option<String>,
    pub error_text: Option<String>,
    pub results: Vec<String>,
}

/// The shopper's prepared photo. Dropped (released) whenever it is
/// replaced, cleared, or the widget closes.
#[derive(Debug, Clone)]
pub struct UserPhoto {
    pub path: PathBuf,
    pub encoded: EncodedImage,
}

/// Per-widget generation options, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct JobOptions {
    pub category: Category,
    pub mode: RunMode,
    pub garment_photo_type: GarmentPhotoType,
    pub num_samples: u8,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            category: Category::OnePieces,
            mode: RunMode::Balanced,
            garment_photo_type: GarmentPhotoType::Auto,
            num_samples: 1,
        }
    }
}

/// Any failure a run can surface to the shopper.
#[derive(Debug, thiserror::Error)]
pub enum TryOnError {
    #[error("widget is not open")]
    NotOpen,

    #[error("no photo selected")]
    NoPhoto,

    #[error("invalid job request: {0}")]
    Validation(garde::Report),

    #[error(transparent)]
    Prepare(#[from] PrepareError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Poll(#[from] PollError),
}

/// How a run ended internally. Quiet ends never touch the UI state.
enum RunEnd {
    Completed(Vec<String>),
    Quiet,
}

struct Shared {
    state: Mutex<WidgetState>,
    garment: Mutex<Option<String>>,
    photo: Mutex<Option<UserPhoto>>,
    active: ActiveJob,
    cancel: Mutex<CancellationToken>,
}

/// One try-on widget instance.
#[derive(Clone)]
pub struct WidgetController {
    api: Arc<dyn TryOnApi>,
    sessions: Arc<dyn SessionStore>,
    config: Arc<TryOnConfig>,
    options: JobOptions,
    /// Client for fetching garment assets; these bypass the generation API.
    http: reqwest::Client,
    shared: Arc<Shared>,
}

impl WidgetController {
    pub fn new(
        api: Arc<dyn TryOnApi>,
        sessions: Arc<dyn SessionStore>,
        config: TryOnConfig,
    ) -> Self {
        Self::with_options(api, sessions, config, JobOptions::default())
    }

    pub fn with_options(
        api: Arc<dyn TryOnApi>,
        sessions: Arc<dyn SessionStore>,
        config: TryOnConfig,
        options: JobOptions,
    ) -> Self {
        Self {
            api,
            sessions,
            config: Arc::new(config),
            options,
            http: reqwest::Client::new(),
            shared: Arc::new(Shared {
                state: Mutex::new(WidgetState::default()),
                garment: Mutex::new(None),
                photo: Mutex::new(None),
                active: ActiveJob::new(),
                cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Snapshot of the observable UI state.
    pub fn state(&self) -> WidgetState {
        self.shared.state.lock().unwrap().clone()
    }

    /// Activate the widget for a garment. Resets UI state and arms a fresh
    /// cancellation token.
    pub fn open(&self, garment_image_url: &str) {
        tracing::debug!(garment = %garment_image_url, "Widget opened");
        *self.shared.garment.lock().unwrap() = Some(garment_image_url.to_string());
        *self.shared.cancel.lock().unwrap() = CancellationToken::new();
        *self.shared.state.lock().unwrap() = WidgetState::default();
    }

    /// Dismiss the widget: flag cancellation for any in-flight loop, drop
    /// the photo, forget the active handle, and reset UI state. The remote
    /// job itself keeps running; the service has no cancel endpoint.
    pub fn close(&self) {
        tracing::debug!("Widget closed");
        self.shared.cancel.lock().unwrap().cancel();
        self.shared.active.clear();
        self.release_photo();
        *self.shared.garment.lock().unwrap() = None;
        *self.shared.state.lock().unwrap() = WidgetState::default();
        if let Err(e) = self.sessions.clear() {
            tracing::warn!(error = %e, "Failed to clear persisted session");
        }
    }

    /// Prepare and store the shopper's photo, replacing (and releasing)
    /// any previous one. A failure becomes the widget's error message.
    pub async fn select_photo(&self, path: &Path) -> Result<(), TryOnError> {
        let source = ImageSource::File(path.to_path_buf());
        match prepare(&self.http, &source, self.config.max_image_edge).await {
            Ok(encoded) => {
                self.release_photo();
                *self.shared.photo.lock().unwrap() = Some(UserPhoto {
                    path: path.to_path_buf(),
                    encoded,
                });
                self.update_state(|s| s.error_text = None);
                Ok(())
            }
            Err(e) => {
                let err = TryOnError::from(e);
                self.update_state(|s| s.error_text = Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Drop the stored photo.
    pub fn clear_photo(&self) {
        self.release_photo();
    }

    /// Run one try-on end to end: resume a persisted job if one exists,
    /// otherwise prepare, submit, and poll. All outcomes land in the
    /// observable state; cancelled or superseded runs end silently.
    pub async fn run(&self) {
        let cancel = self.shared.cancel.lock().unwrap().clone();

        self.update_state(|s| {
            s.phase = WidgetPhase::Preparing;
            s.loading = true;
            s.status_text = Some("Preparing images".to_string());
            s.error_text = None;
            s.results.clear();
        });

        match self.run_inner(&cancel).await {
            Ok(RunEnd::Completed(results)) => {
                tracing::info!(results = results.len(), "Try-on succeeded");
                self.update_state(|s| {
                    s.phase = WidgetPhase::Succeeded;
                    s.loading = false;
                    s.status_text = Some("Done".to_string());
                    s.results = results;
                });
            }
            Ok(RunEnd::Quiet) => {
                tracing::debug!("Run ended quietly");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Try-on failed");
                self.update_state(|s| {
                    s.phase = WidgetPhase::Failed;
                    s.loading = false;
                    s.status_text = None;
                    s.error_text = Some(e.to_string());
                });
            }
        }
    }

    async fn run_inner(&self, cancel: &CancellationToken) -> Result<RunEnd, TryOnError> {
        let garment = self
            .shared
            .garment
            .lock()
            .unwrap()
            .clone()
            .ok_or(TryOnError::NotOpen)?;
        let photo = self
            .shared
            .photo
            .lock()
            .unwrap()
            .clone()
            .ok_or(TryOnError::NoPhoto)?;

        if let Some(end) = self.try_resume(cancel).await {
            return Ok(end);
        }

        let garment_image = prepare(
            &self.http,
            &ImageSource::from_garment_url(&garment),
            self.config.max_image_edge,
        )
        .await?;

        let mut request = JobRequest::new(
            &self.config.model_name,
            photo.encoded,
            garment_image,
            self.options.category,
            self.options.mode,
            self.options.num_samples,
        );
        request.inputs.garment_photo_type = self.options.garment_photo_type;
        request.validate().map_err(TryOnError::Validation)?;

        self.update_state(|s| {
            s.phase = WidgetPhase::Submitting;
            s.status_text = Some("Submitting request".to_string());
        });

        let sink = self.sink();
        let job_id = match submit(self.api.as_ref(), &self.config, &request, &sink, cancel).await? {
            SubmitOutcome::Submitted(id) => id,
            SubmitOutcome::Cancelled => return Ok(RunEnd::Quiet),
        };

        // This run now owns the widget's active slot; any older loop will
        // notice and bow out.
        self.shared.active.set(job_id.clone());
        if let Err(e) = self.sessions.save(&ResumableSession::new(job_id.clone())) {
            tracing::warn!(error = %e, "Failed to persist session");
        }

        self.update_state(|s| {
            s.phase = WidgetPhase::Polling;
            s.status_text = Some("Generating".to_string());
        });

        self.drive(&job_id, &sink, cancel).await.map_err(Into::into)
    }

    /// Poll a job to its end, then release the active slot and persisted
    /// session if they still belong to it.
    async fn drive(
        &self,
        job_id: &JobId,
        sink: &StatusSink,
        cancel: &CancellationToken,
    ) -> Result<RunEnd, PollError> {
        let result = poll(
            self.api.as_ref(),
            &self.config,
            job_id,
            &self.shared.active,
            sink,
            cancel,
        )
        .await;

        match result {
            Ok(PollOutcome::Completed(results)) => {
                self.shared.active.clear_if(job_id);
                self.clear_session_for(job_id);
                Ok(RunEnd::Completed(results))
            }
            Ok(PollOutcome::Cancelled) | Ok(PollOutcome::Superseded) => Ok(RunEnd::Quiet),
            Err(e) => {
                self.shared.active.clear_if(job_id);
                self.clear_session_for(job_id);
                Err(e)
            }
        }
    }

    /// Attempt to reattach to a persisted job. Any failure clears the
    /// stale session and falls through to a fresh submission; it is never
    /// reported as if the new run had failed.
    async fn try_resume(&self, cancel: &CancellationToken) -> Option<RunEnd> {
        // Resumption reattaches after a restart. While this instance already
        // has a live job, a new run supersedes it instead.
        if self.shared.active.current().is_some() {
            return None;
        }

        let prior = match self.sessions.load() {
            Ok(session) => session?,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read persisted session");
                return None;
            }
        };

        tracing::info!(job_id = %prior.job_id, "Resuming persisted job");
        self.shared.active.set(prior.job_id.clone());
        self.update_state(|s| {
            s.phase = WidgetPhase::Polling;
            s.status_text = Some("Checking an earlier generation".to_string());
        });

        let sink = self.sink();
        match self.drive(&prior.job_id, &sink, cancel).await {
            Ok(end) => Some(end),
            Err(e) => {
                tracing::debug!(job_id = %prior.job_id, error = %e, "Resumption failed, starting fresh");
                None
            }
        }
    }

    fn sink(&self) -> Box<StatusSink> {
        let shared = self.shared.clone();
        Box::new(move |msg: String| {
            tracing::debug!(status = %msg, "Widget status");
            shared.state.lock().unwrap().status_text = Some(msg);
        })
    }

    fn release_photo(&self) {
        if let Some(photo) = self.shared.photo.lock().unwrap().take() {
            tracing::debug!(path = %photo.path.display(), "Released user photo");
        }
    }

    fn clear_session_for(&self, job_id: &JobId) {
        let owned = matches!(
            self.sessions.load(),
            Ok(Some(session)) if session.job_id == *job_id
        );
        if owned {
            if let Err(e) = self.sessions.clear() {
                tracing::warn!(error = %e, "Failed to clear persisted session");
            }
        }
    }

    fn update_state(&self, apply: impl FnOnce(&mut WidgetState)) {
        apply(&mut self.shared.state.lock().unwrap());
    }
}
