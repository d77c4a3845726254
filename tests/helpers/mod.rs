//! Test doubles and fixtures for the orchestrator integration tests.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};

use tryon_widget::models::job::JobId;
use tryon_widget::models::request::JobRequest;
use tryon_widget::services::api::{ApiError, ApiReply, TryOnApi};

/// An inline garment so tests never touch the network.
pub const GARMENT_DATA_URI: &str = "data:image/png;base64,iVBORw0KGgo=";

/// A scriptable stand-in for the generation service.
///
/// Run replies are consumed in order; status replies are consumed per job
/// id, falling back to that job's default reply (or "running") when the
/// scripted queue is empty.
pub struct FakeService {
    run_queue: Mutex<VecDeque<ApiReply>>,
    status_queues: Mutex<HashMap<String, VecDeque<ApiReply>>>,
    status_defaults: Mutex<HashMap<String, ApiReply>>,
    run_calls: AtomicUsize,
    status_log: Mutex<Vec<String>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            run_queue: Mutex::new(VecDeque::new()),
            status_queues: Mutex::new(HashMap::new()),
            status_defaults: Mutex::new(HashMap::new()),
            run_calls: AtomicUsize::new(0),
            status_log: Mutex::new(Vec::new()),
        }
    }

    pub fn script_run(&self, reply: ApiReply) {
        self.run_queue.lock().unwrap().push_back(reply);
    }

    pub fn script_status(&self, id: &str, reply: ApiReply) {
        self.status_queues
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn default_status(&self, id: &str, reply: ApiReply) {
        self.status_defaults.lock().unwrap().insert(id.to_string(), reply);
    }

    pub fn run_count(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> usize {
        self.status_log.lock().unwrap().len()
    }

    pub fn status_count_for(&self, id: &str) -> usize {
        self.status_log.lock().unwrap().iter().filter(|s| s.as_str() == id).count()
    }
}

#[async_trait]
impl TryOnApi for FakeService {
    async fn run(&self, _request: &JobRequest) -> Result<ApiReply, ApiError> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .run_queue
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted /run call");
        Ok(reply)
    }

    async fn status(&self, id: &JobId) -> Result<ApiReply, ApiError> {
        self.status_log.lock().unwrap().push(id.as_str().to_string());
        if let Some(reply) = self
            .status_queues
            .lock()
            .unwrap()
            .get_mut(id.as_str())
            .and_then(|queue| queue.pop_front())
        {
            return Ok(reply);
        }
        if let Some(reply) = self.status_defaults.lock().unwrap().get(id.as_str()) {
            return Ok(reply.clone());
        }
        Ok(running())
    }
}

pub fn accepted(id: &str) -> ApiReply {
    ApiReply {
        status: 200,
        retry_after: None,
        body: format!(r#"{{"id":"{id}"}}"#),
    }
}

pub fn rate_limited(retry_after: Option<u64>) -> ApiReply {
    ApiReply {
        status: 429,
        retry_after,
        body: String::new(),
    }
}

pub fn running() -> ApiReply {
    ApiReply {
        status: 200,
        retry_after: None,
        body: r#"{"status":"running"}"#.to_string(),
    }
}

pub fn completed(urls: &[&str]) -> ApiReply {
    let output: Vec<String> = urls.iter().map(|u| u.to_string()).collect();
    ApiReply {
        status: 200,
        retry_after: None,
        body: format!(
            r#"{{"status":"completed","output":{}}}"#,
            serde_json::to_string(&output).unwrap()
        ),
    }
}

pub fn failed(message: &str) -> ApiReply {
    ApiReply {
        status: 200,
        retry_after: None,
        body: format!(r#"{{"status":"failed","error":{{"message":"{message}"}}}}"#),
    }
}

pub fn http(status: u16, body: &str) -> ApiReply {
    ApiReply {
        status,
        retry_after: None,
        body: body.to_string(),
    }
}

/// Write a small valid PNG the controller can select as a user photo.
pub fn photo_file(dir: &tempfile::TempDir) -> PathBuf {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, image::Rgb([90, 90, 90])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    let path = dir.path().join("shopper.png");
    std::fs::write(&path, buf).unwrap();
    path
}
