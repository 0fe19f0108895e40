//! Local agent transport
//!
//! Instead of talking to the review service directly, the page's serialized
//! DOM is posted to an agent process on the loopback interface, which does
//! resource discovery and uploading itself.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, warn};
use vizreg_browser::scripts::ROOT_HTML;
use vizreg_browser::PageDriver;
use vizreg_core::config::AgentConfig;
use vizreg_core::{Result, SnapshotOptions, VizregError};

use crate::environment::{client_info, default_extras, environment_info};

pub const HEALTHCHECK_PATH: &str = "/percy/healthcheck";
pub const SNAPSHOT_PATH: &str = "/percy/snapshot";
pub const VERSION_HEADER: &str = "x-percy-core-version";
pub const SUPPORTED_MAJOR_VERSION: u64 = 1;

/// Client for a local snapshot agent
#[derive(Debug)]
pub struct AgentClient {
    http: reqwest::Client,
    base_url: String,
    environment_info: String,
    healthy: OnceCell<bool>,
    disabled: AtomicBool,
}

impl AgentClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| VizregError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: format!("http://{}:{}", host, port),
            environment_info: environment_info(None, &default_extras()),
            healthy: OnceCell::new(),
            disabled: AtomicBool::new(false),
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        Self::new(&config.host, config.port)
    }

    pub fn with_environment_info(mut self, environment_info: impl Into<String>) -> Self {
        self.environment_info = environment_info.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    /// Checked once per client; an unhealthy agent disables the client
    pub async fn is_agent_running(&self) -> bool {
        if self.is_disabled() {
            return false;
        }
        let healthy = *self.healthy.get_or_init(|| self.healthcheck()).await;
        if !healthy {
            self.disabled.store(true, Ordering::SeqCst);
        }
        healthy
    }

    async fn healthcheck(&self) -> bool {
        let url = format!("{}{}", self.base_url, HEALTHCHECK_PATH);
        let problem = match self.http.get(&url).send().await {
            Err(e) => format!("not reachable at {} ({})", self.base_url, e),
            Ok(response) if !response.status().is_success() => {
                format!("healthcheck returned {}", response.status())
            }
            Ok(response) => {
                let version = response
                    .headers()
                    .get(VERSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                match version.as_deref().and_then(major_version) {
                    Some(SUPPORTED_MAJOR_VERSION) => return true,
                    Some(_) => format!(
                        "unsupported version {}",
                        version.as_deref().unwrap_or_default()
                    ),
                    None => "did not report a version".to_string(),
                }
            }
        };
        warn!("Snapshot agent {}; snapshots disabled for this session", problem);
        false
    }

    /// Post the page's DOM to the agent
    ///
    /// Only a missing `name` is an error; every other failure is logged and
    /// yields `Ok(false)`.
    pub async fn snapshot(&self, page: &dyn PageDriver, options: &SnapshotOptions) -> Result<bool> {
        let name = options.name.as_deref().ok_or(VizregError::MissingSnapshotName)?;
        if !self.is_agent_running().await {
            return Ok(false);
        }

        let body = match self.payload(page, options).await {
            Ok(body) => body,
            Err(e) => {
                error!("Could not capture DOM for snapshot {}: {}", name, e);
                return Ok(false);
            }
        };

        let url = format!("{}{}", self.base_url, SNAPSHOT_PATH);
        match self.http.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Agent accepted snapshot {}", name);
                Ok(true)
            }
            Ok(response) => {
                error!("Agent rejected snapshot {}: {}", name, response.status());
                Ok(false)
            }
            Err(e) => {
                error!("Agent rejected snapshot {}: {}", name, e);
                Ok(false)
            }
        }
    }

    async fn payload(&self, page: &dyn PageDriver, options: &SnapshotOptions) -> Result<Value> {
        let dom_snapshot = if page.capability().can_evaluate() {
            ROOT_HTML.decode::<String>(page.evaluate(&ROOT_HTML.source()).await?)?
        } else {
            page.html().await?
        };

        let mut body = json!({
            "url": page.current_url().await?,
            "domSnapshot": dom_snapshot,
            "clientInfo": client_info(),
            "environmentInfo": self.environment_info,
        });
        if let (Some(fields), Value::Object(extra)) =
            (body.as_object_mut(), serde_json::to_value(options)?)
        {
            fields.extend(extra);
        }
        Ok(body)
    }
}

/// Leading integer of a dotted version string
fn major_version(version: &str) -> Option<u64> {
    version.trim().split('.').next()?.parse().ok()
}
