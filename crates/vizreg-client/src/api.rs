//! The remote review service, as the lifecycle sees it

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use vizreg_core::{sha256_hex, ApiError, Resource, SnapshotOptions};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Response to build creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResponse {
    pub id: String,
    /// Hashes the service has no bytes for yet
    pub missing_resource_ids: Vec<String>,
    pub web_url: Option<String>,
}

/// Response to snapshot creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotResponse {
    pub id: String,
    pub missing_resource_ids: Vec<String>,
}

/// Trait for the review service API (allows mocking in tests)
#[async_trait]
pub trait ReviewApi: Send + Sync {
    async fn create_build(&self, repo_slug: &str, resources: &[Resource]) -> ApiResult<BuildResponse>;

    async fn finalize_build(&self, build_id: &str) -> ApiResult<()>;

    async fn create_snapshot(
        &self,
        build_id: &str,
        resources: &[Resource],
        options: &SnapshotOptions,
    ) -> ApiResult<SnapshotResponse>;

    async fn upload_resource(&self, build_id: &str, content: &[u8]) -> ApiResult<()>;

    async fn finalize_snapshot(&self, snapshot_id: &str) -> ApiResult<()>;
}

/// One recorded call against [`MockReviewApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    CreateBuild {
        repo_slug: String,
        resource_ids: Vec<String>,
    },
    FinalizeBuild(String),
    CreateSnapshot {
        build_id: String,
        name: Option<String>,
        resource_ids: Vec<String>,
    },
    /// Carries the sha of the uploaded bytes
    UploadResource { build_id: String, sha: String },
    FinalizeSnapshot(String),
}

/// Operations a [`MockReviewApi`] can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    CreateBuild,
    FinalizeBuild,
    CreateSnapshot,
    UploadResource,
    FinalizeSnapshot,
}

/// Mock review API for testing
///
/// Records every call. Missing-resource lists are scripted: one list for the
/// build, and a queue consumed by successive snapshot creations.
#[derive(Debug, Default)]
pub struct MockReviewApi {
    calls: Mutex<Vec<ApiCall>>,
    build_missing: Vec<String>,
    web_url: Option<String>,
    snapshot_missing: Mutex<VecDeque<Vec<String>>>,
    failures: Mutex<HashMap<ApiOperation, ApiError>>,
    snapshot_count: Mutex<usize>,
}

impl MockReviewApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_build_missing(mut self, shas: Vec<String>) -> Self {
        self.build_missing = shas;
        self
    }

    pub fn with_web_url(mut self, url: impl Into<String>) -> Self {
        self.web_url = Some(url.into());
        self
    }

    /// Queue the missing list for the next unanswered snapshot creation
    pub fn with_snapshot_missing(self, shas: Vec<String>) -> Self {
        if let Ok(mut queue) = self.snapshot_missing.lock() {
            queue.push_back(shas);
        }
        self
    }

    /// Make every call of `operation` fail with `error` from now on
    pub fn fail_on(&self, operation: ApiOperation, error: ApiError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(operation, error);
        }
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Shas passed to `upload_resource`, in order
    pub fn uploaded_shas(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::UploadResource { sha, .. } => Some(sha),
                _ => None,
            })
            .collect()
    }

    fn record(&self, operation: ApiOperation, call: ApiCall) -> ApiResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        match self.failures.lock().ok().and_then(|f| f.get(&operation).cloned()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn ids(resources: &[Resource]) -> Vec<String> {
    resources.iter().map(|r| r.sha().to_string()).collect()
}

#[async_trait]
impl ReviewApi for MockReviewApi {
    async fn create_build(&self, repo_slug: &str, resources: &[Resource]) -> ApiResult<BuildResponse> {
        self.record(
            ApiOperation::CreateBuild,
            ApiCall::CreateBuild {
                repo_slug: repo_slug.to_string(),
                resource_ids: ids(resources),
            },
        )?;
        Ok(BuildResponse {
            id: "build-1".to_string(),
            missing_resource_ids: self.build_missing.clone(),
            web_url: self.web_url.clone(),
        })
    }

    async fn finalize_build(&self, build_id: &str) -> ApiResult<()> {
        self.record(
            ApiOperation::FinalizeBuild,
            ApiCall::FinalizeBuild(build_id.to_string()),
        )
    }

    async fn create_snapshot(
        &self,
        build_id: &str,
        resources: &[Resource],
        options: &SnapshotOptions,
    ) -> ApiResult<SnapshotResponse> {
        self.record(
            ApiOperation::CreateSnapshot,
            ApiCall::CreateSnapshot {
                build_id: build_id.to_string(),
                name: options.name.clone(),
                resource_ids: ids(resources),
            },
        )?;

        let number = match self.snapshot_count.lock() {
            Ok(mut count) => {
                *count += 1;
                *count
            }
            Err(_) => 0,
        };
        let missing = self
            .snapshot_missing
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_default();

        Ok(SnapshotResponse {
            id: format!("snapshot-{}", number),
            missing_resource_ids: missing,
        })
    }

    async fn upload_resource(&self, build_id: &str, content: &[u8]) -> ApiResult<()> {
        self.record(
            ApiOperation::UploadResource,
            ApiCall::UploadResource {
                build_id: build_id.to_string(),
                sha: sha256_hex(content),
            },
        )
    }

    async fn finalize_snapshot(&self, snapshot_id: &str) -> ApiResult<()> {
        self.record(
            ApiOperation::FinalizeSnapshot,
            ApiCall::FinalizeSnapshot(snapshot_id.to_string()),
        )
    }
}
