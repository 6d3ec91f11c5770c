//! Service request protocol (client side)
//!
//! Requests and responses are exchanged with the host-side service through
//! JSON files in a shared watch directory. This tool only writes requests
//! and reads responses; the service owns everything in between.

#![allow(dead_code)]

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Suffix of request files in the watch directory
pub const REQUEST_SUFFIX: &str = ".request.json";

/// Suffix of response files in the watch directory
pub const RESPONSE_SUFFIX: &str = ".response.json";

/// A test run request handed to the service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRequest {
    /// Unique request id, also the base of the file names
    pub id: String,

    /// Submitting client, for service-side logs
    pub client: String,

    /// Submission time
    pub timestamp: DateTime<Utc>,

    /// Target test assembly the service should hand to its runner
    pub assembly: PathBuf,
}

impl RunRequest {
    pub fn new(assembly: impl Into<PathBuf>) -> Self {
        Self {
            id: generate_request_id(),
            client: format!("plugtest/{}", env!("CARGO_PKG_VERSION")),
            timestamp: Utc::now(),
            assembly: assembly.into(),
        }
    }

    /// Load a prepared request file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open request file: {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse request file: {}", path.display()))
    }
}

/// The service's answer to a request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResponse {
    /// Id of the request this answers
    pub id: String,

    /// Completion time
    pub timestamp: DateTime<Utc>,

    /// Directory the service wrote result artifacts into
    pub directory: PathBuf,

    /// Failure text; empty on success
    #[serde(default)]
    pub message: String,
}

impl RunResponse {
    pub fn is_success(&self) -> bool {
        self.message.is_empty()
    }
}

/// Path of a request file inside the watch directory
pub fn request_path(watch_dir: &Path, id: &str) -> PathBuf {
    watch_dir.join(format!("{id}{REQUEST_SUFFIX}"))
}

/// Path of a response file inside the watch directory
pub fn response_path(watch_dir: &Path, id: &str) -> PathBuf {
    watch_dir.join(format!("{id}{RESPONSE_SUFFIX}"))
}

/// Write a request into the watch directory
pub fn submit_request(watch_dir: &Path, request: &RunRequest) -> Result<PathBuf> {
    if !watch_dir.is_dir() {
        bail!("watch directory not found: {}", watch_dir.display());
    }

    let path = request_path(watch_dir, &request.id);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create request file: {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), request)
        .context("Failed to write request")?;

    info!("Submitted request {} to {}", request.id, path.display());
    Ok(path)
}

/// Read the response for a request id
pub fn read_response(watch_dir: &Path, id: &str) -> Result<RunResponse> {
    let path = response_path(watch_dir, id);
    let file = File::open(&path)
        .with_context(|| format!("Failed to open response file: {}", path.display()))?;
    let response: RunResponse =
        serde_json::from_reader(BufReader::new(file)).context("Failed to parse response")?;

    debug!("Read response for {} from {}", id, path.display());
    Ok(response)
}

/// Poll the watch directory until the response appears or the timeout passes
pub fn await_response(
    watch_dir: &Path,
    id: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<RunResponse>> {
    let deadline = Instant::now() + timeout;

    loop {
        if response_path(watch_dir, id).exists() {
            return read_response(watch_dir, id).map(Some);
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(interval);
    }
}

/// Generate a unique request id
pub fn generate_request_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_request_id() {
        let id1 = generate_request_id();
        let id2 = generate_request_id();
        assert!(!id1.is_empty());
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_submit_and_read_roundtrip() {
        let dir = tempdir().unwrap();
        let request = RunRequest::new("/tmp/libsuite.so");

        let path = submit_request(dir.path(), &request).unwrap();
        assert!(path.exists());

        let loaded = RunRequest::load(&path).unwrap();
        assert_eq!(loaded.id, request.id);
        assert_eq!(loaded.assembly, request.assembly);
    }

    #[test]
    fn test_submit_rejects_missing_watch_dir() {
        let request = RunRequest::new("/tmp/libsuite.so");
        let result = submit_request(Path::new("/nonexistent/watch"), &request);
        assert!(result.is_err());
    }

    #[test]
    fn test_await_response_finds_existing() {
        let dir = tempdir().unwrap();
        let response = RunResponse {
            id: "req_1".to_string(),
            timestamp: Utc::now(),
            directory: dir.path().join("out"),
            message: String::new(),
        };
        let file = File::create(response_path(dir.path(), "req_1")).unwrap();
        serde_json::to_writer(BufWriter::new(file), &response).unwrap();

        let found = await_response(
            dir.path(),
            "req_1",
            Duration::from_millis(100),
            Duration::from_millis(10),
        )
        .unwrap();

        let found = found.expect("response should be found");
        assert!(found.is_success());
        assert_eq!(found.id, "req_1");
    }

    #[test]
    fn test_await_response_times_out() {
        let dir = tempdir().unwrap();
        let found = await_response(
            dir.path(),
            "req_missing",
            Duration::from_millis(30),
            Duration::from_millis(10),
        )
        .unwrap();
        assert!(found.is_none());
    }
}
