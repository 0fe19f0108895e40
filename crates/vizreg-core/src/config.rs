//! Configuration management for vizreg
//!
//! Settings are read from `.vizreg.toml` in the project root and then layered
//! with `VIZREG_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Result, VizregError};

/// Name of the project-level config file
pub const CONFIG_FILE: &str = ".vizreg.toml";

pub const TOKEN_ENV: &str = "VIZREG_TOKEN";
pub const ENABLE_ENV: &str = "VIZREG_ENABLE";
pub const REPO_ENV: &str = "VIZREG_REPO";
pub const API_URL_ENV: &str = "VIZREG_API_URL";
pub const CI_ENV: &str = "CI";

/// Default byte ceiling for build-time resources; larger files are skipped
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 15 * 1024 * 1024;

/// Project-level vizreg configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizregConfig {
    /// Repository slug builds are created under (`owner/name`)
    #[serde(default)]
    pub repo_slug: Option<String>,

    /// API token; normally supplied through the environment
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Explicit enable/disable, overriding token detection
    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub loader: LoaderSettings,

    #[serde(default)]
    pub agent: AgentConfig,
}

/// Remote review API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Which resource loader to use, and its inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// Force a loader; when unset the pipeline/native default applies
    #[serde(default)]
    pub kind: Option<LoaderKind>,

    /// Compiled static assets directory (filesystem loader)
    #[serde(default)]
    pub asset_path: Option<PathBuf>,

    /// URL prefix the asset directory is served under
    #[serde(default)]
    pub base_url: Option<String>,

    /// Extra hosts whose assets count as part of the app under test.
    /// When unset, loopback names are allowed.
    #[serde(default)]
    pub asset_hostnames: Option<Vec<String>>,

    /// Capture same-origin iframe documents alongside the pipeline
    #[serde(default)]
    pub include_iframes: bool,

    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,

    #[serde(default)]
    pub pipeline: Option<PipelineSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderKind {
    Native,
    Filesystem,
    AssetPipeline,
    Hybrid,
}

impl std::fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Filesystem => write!(f, "filesystem"),
            Self::AssetPipeline => write!(f, "asset_pipeline"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for LoaderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "filesystem" => Ok(Self::Filesystem),
            "asset_pipeline" | "asset-pipeline" | "pipeline" => Ok(Self::AssetPipeline),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(format!("Invalid loader: {}", s)),
        }
    }
}

/// Compiled asset pipeline output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Directory holding compiled assets
    pub assets_root: PathBuf,

    /// Logical paths (relative to `assets_root`) declared for precompilation
    #[serde(default)]
    pub precompile: Vec<String>,

    /// URL prefix compiled assets are served under
    #[serde(default = "default_pipeline_prefix")]
    pub url_prefix: String,

    /// Public directory served at the site root
    #[serde(default)]
    pub public_dir: Option<PathBuf>,

    /// Glob patterns of resource URLs to leave out
    #[serde(default)]
    pub ignore_paths: Vec<String>,
}

/// Local agent endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_host")]
    pub host: String,

    #[serde(default = "default_agent_port")]
    pub port: u16,
}

// Default value providers
fn default_api_url() -> String {
    "https://vizreg.io/api/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE_BYTES
}

fn default_pipeline_prefix() -> String {
    "/assets".to_string()
}

fn default_agent_host() -> String {
    "localhost".to_string()
}

fn default_agent_port() -> u16 {
    5338
}

/// Interpret a boolean-ish environment value
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl VizregConfig {
    /// Load configuration from `.vizreg.toml` or use defaults
    pub fn load_or_default(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILE);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| VizregError::Config(format!("Failed to parse config file: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.vizreg.toml`
    pub fn write_default(project_root: &Path) -> Result<PathBuf> {
        let config_path = project_root.join(CONFIG_FILE);
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| VizregError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    /// Layer `VIZREG_*` environment variables over file settings
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Like [`apply_env`](Self::apply_env) with an injectable lookup
    pub fn apply_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
        if let Some(repo) = lookup(REPO_ENV).filter(|r| !r.is_empty()) {
            self.repo_slug = Some(repo);
        }
        if let Some(url) = lookup(API_URL_ENV).filter(|u| !u.is_empty()) {
            self.api.url = url;
        }
        if let Some(raw) = lookup(ENABLE_ENV) {
            match parse_flag(&raw) {
                Some(flag) => self.enabled = Some(flag),
                None => tracing::warn!("ignoring unrecognized {}={}", ENABLE_ENV, raw),
            }
        }
        self
    }
}

impl Default for VizregConfig {
    fn default() -> Self {
        Self {
            repo_slug: None,
            token: None,
            enabled: None,
            api: ApiConfig::default(),
            loader: LoaderSettings::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            kind: None,
            asset_path: None,
            base_url: None,
            asset_hostnames: None,
            include_iframes: false,
            max_file_size_bytes: default_max_file_size(),
            pipeline: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: default_agent_host(),
            port: default_agent_port(),
        }
    }
}
