use serde::{Deserialize, Serialize};
use strum::Display;

/// Opaque job identifier minted by the remote generation service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle of a generation job as reported by the status endpoint.
///
/// `Completed` and `Failed` are terminal; the service never transitions a
/// job out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Body of a successful `POST /run` response.
#[derive(Debug, Deserialize)]
pub struct RunResponse {
    pub id: Option<JobId>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Body of a `GET /status/{id}` response.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub output: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<UpstreamError>,
}

/// Error payload attached to a failed job.
#[derive(Debug, Deserialize)]
pub struct UpstreamError {
    #[serde(default)]
    pub message: Option<String>,
}
