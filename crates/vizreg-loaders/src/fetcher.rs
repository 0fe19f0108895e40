//! Out-of-band resource fetching
//!
//! Sub-resources are fetched by a separate `curl` process instead of an
//! in-process HTTP client. Test suites that stub HTTP inside the process
//! then cannot block asset fetches.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Body and content type of a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// Trait for fetching resource bytes (allows mocking in tests)
///
/// Implementations never fail loudly: any connection error, non-200 status or
/// empty body comes back as `None`.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str, headers: &BTreeMap<String, String>) -> Option<FetchResponse>;
}

/// Fetcher backed by the `curl` binary
///
/// TLS verification is off and redirects are followed, matching what headless
/// browsers do against development servers.
#[derive(Debug, Clone)]
pub struct CurlFetcher {
    program: String,
    max_time: Option<Duration>,
}

impl Default for CurlFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CurlFetcher {
    pub fn new() -> Self {
        Self {
            program: "curl".to_string(),
            max_time: Some(Duration::from_secs(30)),
        }
    }

    /// Use a different curl executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_max_time(mut self, max_time: Option<Duration>) -> Self {
        self.max_time = max_time;
        self
    }

    fn args(&self, url: &str, output: &str, headers: &BTreeMap<String, String>) -> Vec<String> {
        let mut args: Vec<String> = [
            "--insecure",
            "--location",
            "--silent",
            "--show-error",
            "--output",
            output,
            "--write-out",
            WRITE_OUT_FORMAT,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(max_time) = self.max_time {
            args.push("--max-time".to_string());
            args.push(max_time.as_secs().max(1).to_string());
        }
        for (name, value) in headers {
            args.push("--header".to_string());
            args.push(format!("{}: {}", name, value));
        }
        args.push("--url".to_string());
        args.push(url.to_string());
        args
    }
}

const WRITE_OUT_FORMAT: &str = "%{http_code}\n%{content_type}";

/// Parse the `--write-out` report into status code and content type
pub fn parse_write_out(report: &str) -> Option<(u16, Option<String>)> {
    let mut lines = report.lines();
    let status = lines.next()?.trim().parse::<u16>().ok()?;
    let content_type = lines
        .next()
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .map(str::to_string);
    Some((status, content_type))
}

#[async_trait]
impl ResourceFetcher for CurlFetcher {
    async fn fetch(&self, url: &str, headers: &BTreeMap<String, String>) -> Option<FetchResponse> {
        // Only the path is needed; curl writes the body there
        let output = match tempfile::NamedTempFile::new() {
            Ok(file) => file.into_temp_path(),
            Err(e) => {
                warn!("Failed to create temp file for {}: {}", url, e);
                return None;
            }
        };
        let output_path = output.to_string_lossy().to_string();

        debug!("Fetching {}", url);
        let result = Command::new(&self.program)
            .args(self.args(url, &output_path, headers))
            .output()
            .await;

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                warn!("Failed to run {}: {}", self.program, e);
                return None;
            }
        };

        if !report.status.success() {
            debug!(
                "curl exited with {} for {}: {}",
                report.status,
                url,
                String::from_utf8_lossy(&report.stderr).trim()
            );
            return None;
        }

        let (status, content_type) = parse_write_out(&String::from_utf8_lossy(&report.stdout))?;
        if status != 200 {
            debug!("Got status {} for {}", status, url);
            return None;
        }

        let body = tokio::fs::read(&output).await.ok()?;
        if body.is_empty() {
            return None;
        }

        Some(FetchResponse { body, content_type })
    }
}

/// Mock fetcher for testing
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    responses: HashMap<String, FetchResponse>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(
        mut self,
        url: &str,
        body: impl Into<Vec<u8>>,
        content_type: Option<&str>,
    ) -> Self {
        self.responses.insert(
            url.to_string(),
            FetchResponse {
                body: body.into(),
                content_type: content_type.map(str::to_string),
            },
        );
        self
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResourceFetcher for MockFetcher {
    async fn fetch(&self, url: &str, _headers: &BTreeMap<String, String>) -> Option<FetchResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        self.responses.get(url).cloned()
    }
}
