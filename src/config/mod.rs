use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Orchestrator configuration, loaded from `TRYON_`-prefixed environment
/// variables. Every timing and retry knob has a default so the crate works
/// out of the box against a local proxy.
#[derive(Debug, Clone, Deserialize)]
pub struct TryOnConfig {
    /// Base URL of the try-on proxy (e.g. "http://localhost:8787/api/tryon").
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bearer token sent to the generation API, if the deployment talks to
    /// it directly instead of through an authenticating proxy.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Generation model identifier sent with every job.
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Maximum long-edge dimension (px) for submitted images.
    #[serde(default = "default_max_image_edge")]
    pub max_image_edge: u32,

    /// Total submission attempts before giving up on a rate-limited run.
    #[serde(default = "default_submit_max_attempts")]
    pub submit_max_attempts: u32,

    /// Wait applied to a 429 submission response without a Retry-After header.
    #[serde(default = "default_submit_retry_fallback_secs")]
    pub submit_retry_fallback_secs: u64,

    /// Initial delay between status polls.
    #[serde(default = "default_poll_base_interval_ms")]
    pub poll_base_interval_ms: u64,

    /// Additive growth of the poll interval per tick.
    #[serde(default = "default_poll_interval_step_ms")]
    pub poll_interval_step_ms: u64,

    /// Upper bound on the poll interval.
    #[serde(default = "default_poll_max_interval_ms")]
    pub poll_max_interval_ms: u64,

    /// Wait applied to a 429 status response without a Retry-After header.
    #[serde(default = "default_poll_retry_fallback_secs")]
    pub poll_retry_fallback_secs: u64,

    /// Total time a job may stay non-terminal before the poll loop gives up.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Where the resumable-session file lives.
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

fn default_api_base() -> String {
    "http://localhost:8787/api/tryon".to_string()
}

fn default_model_name() -> String {
    "tryon-v1.6".to_string()
}

fn default_max_image_edge() -> u32 {
    2000
}

fn default_submit_max_attempts() -> u32 {
    3
}

fn default_submit_retry_fallback_secs() -> u64 {
    15
}

fn default_poll_base_interval_ms() -> u64 {
    3_000
}

fn default_poll_interval_step_ms() -> u64 {
    1_000
}

fn default_poll_max_interval_ms() -> u64 {
    10_000
}

fn default_poll_retry_fallback_secs() -> u64 {
    10
}

fn default_poll_timeout_secs() -> u64 {
    180
}

fn default_session_file() -> PathBuf {
    PathBuf::from(".tryon-session.json")
}

impl TryOnConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("TRYON_").from_env()
    }

    pub fn submit_retry_fallback(&self) -> Duration {
        Duration::from_secs(self.submit_retry_fallback_secs)
    }

    pub fn poll_base_interval(&self) -> Duration {
        Duration::from_millis(self.poll_base_interval_ms)
    }

    pub fn poll_interval_step(&self) -> Duration {
        Duration::from_millis(self.poll_interval_step_ms)
    }

    pub fn poll_max_interval(&self) -> Duration {
        Duration::from_millis(self.poll_max_interval_ms)
    }

    pub fn poll_retry_fallback(&self) -> Duration {
        Duration::from_secs(self.poll_retry_fallback_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

impl Default for TryOnConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            model_name: default_model_name(),
            max_image_edge: default_max_image_edge(),
            submit_max_attempts: default_submit_max_attempts(),
            submit_retry_fallback_secs: default_submit_retry_fallback_secs(),
            poll_base_interval_ms: default_poll_base_interval_ms(),
            poll_interval_step_ms: default_poll_interval_step_ms(),
            poll_max_interval_ms: default_poll_max_interval_ms(),
            poll_retry_fallback_secs: default_poll_retry_fallback_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
            session_file: default_session_file(),
        }
    }
}
