//! Core type definitions for builds and snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;

/// One test run's worth of snapshots on the review service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    /// Opaque identifier assigned by the service
    pub id: String,
    pub repo_slug: String,
    /// Number of build-level resources submitted at creation
    pub resource_count: usize,
    /// Hashes the service asked for when the build was created
    pub missing_resource_ids: Vec<String>,
    /// Where the build can be reviewed, when the service reports it
    pub web_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One captured page state within a build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub build_id: String,
    pub name: String,
    pub resource_count: usize,
    pub missing_resource_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-snapshot options, forwarded to the review service
///
/// Deprecated key names are resolved once when the options are deserialized:
///
/// | field | wire name | accepted aliases |
/// |---|---|---|
/// | `enable_javascript` | `enableJavaScript` | `enableJavascript`, `enable_javascript` |
/// | `min_height` | `minHeight` | `minimumHeight`, `minimum_height` |
/// | `percy_css` | `percyCSS` | `percy_css` |
/// | `request_headers` | `requestHeaders` | `request_headers` |
///
/// Keys not listed here are kept in `extra` and passed through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotOptions {
    /// Stable name for the page state; defaults to the page URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Widths, in pixels, to render at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widths: Option<Vec<u32>>,

    #[serde(
        rename = "enableJavaScript",
        alias = "enableJavascript",
        alias = "enable_javascript",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub enable_javascript: Option<bool>,

    #[serde(
        rename = "minHeight",
        alias = "minimumHeight",
        alias = "minimum_height",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub min_height: Option<u32>,

    /// CSS injected into the page before rendering
    #[serde(
        rename = "percyCSS",
        alias = "percy_css",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub percy_css: Option<String>,

    /// Extra headers for out-of-band resource fetches
    #[serde(
        rename = "requestHeaders",
        alias = "request_headers",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub request_headers: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SnapshotOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Parse an open-ended options bag, resolving legacy key names
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn with_widths(mut self, widths: Vec<u32>) -> Self {
        self.widths = Some(widths);
        self
    }
}
