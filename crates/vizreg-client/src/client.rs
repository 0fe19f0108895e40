//! Build and snapshot lifecycle
//!
//! One [`VisualClient`] drives one build, snapshot after snapshot:
//!
//! ```text
//! Uninitialized --initialize_build--> Initialized --finalize_current_build--> Finalized
//! ```
//!
//! All remote calls run inside the [`ClientState`] rescue policy.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vizreg_browser::PageDriver;
use vizreg_core::{
    Build, Resource, ResourceIndex, Result, Snapshot, SnapshotOptions, VizregConfig, VizregError,
};
use vizreg_loaders::Loader;

use crate::api::ReviewApi;
use crate::environment::{default_extras, environment_info, user_agent};
use crate::http_api::HttpReviewApi;
use crate::state::{ClientState, EnvSignals};

/// Construction options for [`VisualClient`]
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub repo_slug: Option<String>,
    /// Overrides every environment signal when set
    pub enabled: Option<bool>,
    pub signals: EnvSignals,
}

impl ClientOptions {
    pub fn from_config(config: &VizregConfig) -> Self {
        Self {
            repo_slug: config.repo_slug.clone(),
            enabled: None,
            signals: EnvSignals::from_config(config),
        }
    }
}

#[derive(Debug, Clone)]
enum BuildState {
    Uninitialized,
    Initialized(Build),
    Finalized(Build),
}

/// Client for one build on the review service
pub struct VisualClient {
    /// `None` for a client built without credentials
    api: Option<Arc<dyn ReviewApi>>,
    loader: Loader,
    repo_slug: Option<String>,
    state: ClientState,
    build: BuildState,
}

impl std::fmt::Debug for VisualClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualClient")
            .field("has_api", &self.api.is_some())
            .field("loader", &self.loader)
            .field("repo_slug", &self.repo_slug)
            .field("state", &self.state)
            .field("build", &self.build)
            .finish()
    }
}

impl VisualClient {
    pub fn new(api: Arc<dyn ReviewApi>, loader: Loader, options: ClientOptions) -> Self {
        Self {
            api: Some(api),
            loader,
            repo_slug: options.repo_slug,
            state: ClientState::new(options.enabled, options.signals),
            build: BuildState::Uninitialized,
        }
    }

    /// Client that is off for its whole life and has nothing to call
    pub fn disabled(loader: Loader, options: ClientOptions) -> Self {
        Self {
            api: None,
            loader,
            repo_slug: options.repo_slug,
            state: ClientState::new(Some(false), options.signals),
            build: BuildState::Uninitialized,
        }
    }

    /// Client talking to the hosted service described by `config`
    ///
    /// Without a token the client is created disabled and never calls out.
    pub fn from_config(config: &VizregConfig, loader: Loader) -> Result<Self> {
        let options = ClientOptions::from_config(config);
        let agent = user_agent(&environment_info(Some(loader.name()), &default_extras()));

        let api: Arc<dyn ReviewApi> = match HttpReviewApi::from_config(config, &agent) {
            Ok(api) => Arc::new(api),
            Err(e) if config.token.is_none() => {
                debug!("{}", e);
                return Ok(Self::disabled(loader, options));
            }
            Err(e) => return Err(e),
        };

        Ok(Self::new(api, loader, options))
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    pub fn is_failed(&self) -> bool {
        self.state.is_failed()
    }

    pub fn disable(&self) {
        self.state.disable();
    }

    /// The build, if one has been created; never creates one
    pub fn current_build(&self) -> Option<&Build> {
        if !self.state.is_enabled() {
            return None;
        }
        match &self.build {
            BuildState::Uninitialized => None,
            BuildState::Initialized(build) | BuildState::Finalized(build) => Some(build),
        }
    }

    /// The API to call, or `None` when the client is off
    fn live_api(&self) -> Option<Arc<dyn ReviewApi>> {
        if !self.state.is_enabled() {
            return None;
        }
        self.api.clone()
    }

    /// Create the build once, uploading whatever build resources the service lacks
    ///
    /// Returns `Ok(None)` when disabled or when a connection failure was rescued.
    pub async fn initialize_build(&mut self) -> Result<Option<Build>> {
        let Some(api) = self.live_api() else {
            return Ok(None);
        };
        if let BuildState::Initialized(build) | BuildState::Finalized(build) = &self.build {
            return Ok(Some(build.clone()));
        }

        let repo_slug = self.repo_slug.clone().ok_or_else(|| {
            VizregError::Config(format!(
                "a repository slug is required (set repo_slug or {})",
                vizreg_core::config::REPO_ENV
            ))
        })?;
        let resources = self.loader.build_resources().await?;
        debug!("Creating build with {} resources", resources.len());

        let api = api.as_ref();
        let repo = repo_slug.as_str();
        let resources_ref = resources.as_slice();
        let created = self
            .state
            .rescue_connection_failures("initialize build", || async move {
                let response = api.create_build(repo, resources_ref).await?;
                let index: ResourceIndex = resources_ref.iter().cloned().collect();
                upload_missing(api, &response.id, &response.missing_resource_ids, &index).await?;
                Ok::<_, VizregError>(response)
            })
            .await?;

        let Some(response) = created else {
            return Ok(None);
        };

        let build = Build {
            id: response.id,
            repo_slug,
            resource_count: resources.len(),
            missing_resource_ids: response.missing_resource_ids,
            web_url: response.web_url,
            created_at: Utc::now(),
        };
        info!("Created build {}", build.id);
        self.build = BuildState::Initialized(build.clone());
        Ok(Some(build))
    }

    /// Finalize the build
    ///
    /// Returns `Ok(None)` when disabled, including after a rescued failure
    /// left no build behind. Only an enabled client without a build errors.
    pub async fn finalize_current_build(&mut self) -> Result<Option<Build>> {
        let Some(api) = self.live_api() else {
            return Ok(None);
        };
        let build = match &self.build {
            BuildState::Uninitialized => return Err(VizregError::BuildNotInitialized),
            BuildState::Finalized(build) => {
                warn!("Build {} is already finalized", build.id);
                return Ok(Some(build.clone()));
            }
            BuildState::Initialized(build) => build.clone(),
        };

        let api = api.as_ref();
        let id = build.id.as_str();
        let finalized = self
            .state
            .rescue_connection_failures("finalize build", || async move {
                Ok::<_, VizregError>(api.finalize_build(id).await?)
            })
            .await?;

        if finalized.is_none() {
            return Ok(None);
        }
        info!("Finalized build {}", build.id);
        self.build = BuildState::Finalized(build.clone());
        Ok(Some(build))
    }

    /// Capture the page's current state as a snapshot of the current build
    ///
    /// Returns `Ok(true)` when the snapshot was created and finalized,
    /// `Ok(false)` when disabled, rescued, or rejected as a bad request.
    pub async fn snapshot(&self, page: &dyn PageDriver, options: SnapshotOptions) -> Result<bool> {
        Ok(self.snapshot_details(page, options).await?.is_some())
    }

    /// Like [`snapshot`](Self::snapshot), returning what was created
    pub async fn snapshot_details(
        &self,
        page: &dyn PageDriver,
        mut options: SnapshotOptions,
    ) -> Result<Option<Snapshot>> {
        let Some(api) = self.live_api() else {
            return Ok(None);
        };
        let build = match &self.build {
            BuildState::Uninitialized => return Err(VizregError::BuildNotInitialized),
            BuildState::Finalized(build) => {
                return Err(VizregError::BuildAlreadyFinalized(build.id.clone()))
            }
            BuildState::Initialized(build) => build,
        };

        let resources = self
            .loader
            .snapshot_resources(page, &options.request_headers)
            .await?;
        if options.name.is_none() {
            options.name = Some(page.current_url().await?);
        }
        let name = options.name.clone().unwrap_or_default();
        let index: ResourceIndex = resources.iter().cloned().collect();
        debug!(
            "Snapshot {} has {} resources ({} distinct)",
            name,
            resources.len(),
            index.len()
        );

        let api = api.as_ref();
        let build_id = build.id.as_str();
        let resources_ref = resources.as_slice();
        let options_ref = &options;
        let index_ref = &index;
        let outcome = self
            .state
            .rescue_connection_failures("snapshot", || async move {
                let response = match api.create_snapshot(build_id, resources_ref, options_ref).await {
                    Ok(response) => response,
                    Err(e) if e.is_bad_request() => {
                        warn!("Skipping snapshot {}: {}", options_ref.name.as_deref().unwrap_or(""), e);
                        return Ok(None);
                    }
                    Err(e) => return Err(e.into()),
                };
                upload_missing(api, build_id, &response.missing_resource_ids, index_ref).await?;
                api.finalize_snapshot(&response.id).await?;
                Ok::<_, VizregError>(Some(response))
            })
            .await?;

        let Some(response) = outcome.flatten() else {
            return Ok(None);
        };

        debug!("Finalized snapshot {} ({})", response.id, name);
        Ok(Some(Snapshot {
            id: response.id,
            build_id: build.id.clone(),
            name,
            resource_count: resources.len(),
            missing_resource_ids: response.missing_resource_ids,
            created_at: Utc::now(),
        }))
    }
}

/// Upload each distinct missing hash once, in the order the service listed them
async fn upload_missing(
    api: &dyn ReviewApi,
    build_id: &str,
    missing: &[String],
    index: &ResourceIndex,
) -> Result<usize> {
    let mut uploaded: HashSet<&str> = HashSet::new();
    for sha in missing {
        if uploaded.contains(sha.as_str()) {
            continue;
        }
        let Some(resource) = index.get(sha) else {
            error!("Service requested unknown resource {}; skipping", sha);
            continue;
        };
        upload(api, build_id, resource).await?;
        uploaded.insert(sha);
    }
    Ok(uploaded.len())
}

async fn upload(api: &dyn ReviewApi, build_id: &str, resource: &Resource) -> Result<()> {
    let content = resource.read_content().await?;
    debug!("Uploading {} ({} bytes)", resource.resource_url(), content.len());
    api.upload_resource(build_id, &content).await?;
    Ok(())
}
