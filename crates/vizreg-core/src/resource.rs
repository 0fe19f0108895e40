//! Content-addressed resources
//!
//! A [`Resource`] is one fetchable artifact that accompanies a build or a
//! snapshot. Its identity for upload purposes is the SHA-256 of its bytes,
//! never its URL: two URLs serving identical bytes collapse to one upload.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{Result, VizregError};

/// Hex-encoded SHA-256 digest of `content`
pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Where a resource's bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
enum Content {
    Inline(Vec<u8>),
    OnDisk(PathBuf),
}

/// One content-addressed artifact (HTML, CSS, image, font...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    resource_url: String,
    content: Content,
    sha: String,
    mimetype: Option<String>,
    is_root: bool,
}

impl Resource {
    /// Create a resource from in-memory bytes
    pub fn from_content(resource_url: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        Self {
            resource_url: resource_url.into(),
            sha: sha256_hex(&content),
            content: Content::Inline(content),
            mimetype: None,
            is_root: false,
        }
    }

    /// Create a resource backed by a file; the bytes are read again on upload
    pub fn from_path(resource_url: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bytes = std::fs::read(&path)?;
        Ok(Self::from_path_with_sha(resource_url, path, sha256_hex(&bytes)))
    }

    /// Create a file-backed resource whose digest is already known
    pub fn from_path_with_sha(
        resource_url: impl Into<String>,
        path: impl Into<PathBuf>,
        sha: impl Into<String>,
    ) -> Self {
        Self {
            resource_url: resource_url.into(),
            content: Content::OnDisk(path.into()),
            sha: sha.into(),
            mimetype: None,
            is_root: false,
        }
    }

    /// The page's own HTML document
    pub fn root_html(resource_url: impl Into<String>, html: impl Into<Vec<u8>>) -> Self {
        Self::from_content(resource_url, html)
            .with_mimetype("text/html")
            .as_root()
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    pub fn with_optional_mimetype(mut self, mimetype: Option<String>) -> Self {
        self.mimetype = mimetype;
        self
    }

    pub fn as_root(mut self) -> Self {
        self.is_root = true;
        self
    }

    pub fn resource_url(&self) -> &str {
        &self.resource_url
    }

    pub fn sha(&self) -> &str {
        &self.sha
    }

    pub fn mimetype(&self) -> Option<&str> {
        self.mimetype.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// On-disk location, for file-backed resources
    pub fn path(&self) -> Option<&Path> {
        match &self.content {
            Content::OnDisk(path) => Some(path),
            Content::Inline(_) => None,
        }
    }

    /// In-memory bytes, for inline resources
    pub fn inline_content(&self) -> Option<&[u8]> {
        match &self.content {
            Content::Inline(bytes) => Some(bytes),
            Content::OnDisk(_) => None,
        }
    }

    /// Obtain the bytes to upload, reading from disk when file-backed
    pub async fn read_content(&self) -> Result<Vec<u8>> {
        match &self.content {
            Content::Inline(bytes) => Ok(bytes.clone()),
            Content::OnDisk(path) => tokio::fs::read(path).await.map_err(|e| {
                tracing::warn!(
                    "failed to read {} for resource {}: {}",
                    path.display(),
                    self.resource_url,
                    e
                );
                VizregError::ResourceUnavailable(self.resource_url.clone())
            }),
        }
    }

    /// Wire descriptor sent in resource lists
    pub fn descriptor(&self) -> ResourceDescriptor<'_> {
        ResourceDescriptor {
            id: &self.sha,
            resource_url: &self.resource_url,
            is_root: self.is_root,
            mimetype: self.mimetype.as_deref(),
        }
    }
}

/// Serializable summary of a resource, without its bytes
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResourceDescriptor<'a> {
    pub id: &'a str,
    pub resource_url: &'a str,
    pub is_root: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<&'a str>,
}

/// Resources keyed by sha, in first-seen order
///
/// Later resources with an already-indexed sha are dropped, so each distinct
/// content hash appears (and is uploaded) once.
#[derive(Debug, Clone, Default)]
pub struct ResourceIndex {
    resources: Vec<Resource>,
    by_sha: HashMap<String, usize>,
}

impl ResourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource; returns false when its sha was already present
    pub fn insert(&mut self, resource: Resource) -> bool {
        if self.by_sha.contains_key(resource.sha()) {
            return false;
        }
        self.by_sha
            .insert(resource.sha().to_string(), self.resources.len());
        self.resources.push(resource);
        true
    }

    pub fn get(&self, sha: &str) -> Option<&Resource> {
        self.by_sha.get(sha).map(|&i| &self.resources[i])
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl FromIterator<Resource> for ResourceIndex {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut index = ResourceIndex::new();
        for resource in iter {
            index.insert(resource);
        }
        index
    }
}
