//! Loader strategies and their selection
//!
//! Every strategy answers the same two questions: which resources belong to
//! the whole build, and which accompany one snapshot of the current page.
//! The strategy is chosen once per client configuration.

mod asset_pipeline;
mod filesystem;
mod native;

pub use asset_pipeline::AssetPipelineLoader;
pub use filesystem::FilesystemLoader;
pub use native::NativeLoader;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use vizreg_browser::PageDriver;
use vizreg_core::{LoaderKind, LoaderSettings, Resource, Result, VizregError};

use crate::discovery::root_html_resource;
use crate::fetcher::ResourceFetcher;
use crate::iframes::iframe_resources;
use crate::url_filter::UrlFilter;

/// A user-supplied loading strategy
#[async_trait]
pub trait CustomLoader: Send + Sync {
    fn name(&self) -> &str;

    async fn build_resources(&self) -> Result<Vec<Resource>>;

    async fn snapshot_resources(
        &self,
        page: &dyn PageDriver,
        headers: &BTreeMap<String, String>,
    ) -> Result<Vec<Resource>>;
}

/// The selected loading strategy
#[derive(Clone)]
pub enum LoaderConfig {
    Native(NativeLoader),
    Filesystem(FilesystemLoader),
    AssetPipeline(AssetPipelineLoader),
    /// Asset pipeline plus same-origin iframe documents
    Hybrid(AssetPipelineLoader),
    Custom(Arc<dyn CustomLoader>),
}

/// Runs the selected strategy
#[derive(Clone)]
pub struct Loader {
    config: LoaderConfig,
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader").field("name", &self.name()).finish()
    }
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn native(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self::new(LoaderConfig::Native(NativeLoader::new(fetcher)))
    }

    /// Pick a strategy: custom, then an explicit kind, then the asset
    /// pipeline when configured (hybrid with iframes), else native
    pub fn from_settings(
        settings: &LoaderSettings,
        custom: Option<Arc<dyn CustomLoader>>,
        fetcher: Arc<dyn ResourceFetcher>,
    ) -> Result<Self> {
        if let Some(custom) = custom {
            debug!("Using custom loader {}", custom.name());
            return Ok(Self::new(LoaderConfig::Custom(custom)));
        }

        let kind = settings.kind.unwrap_or(match (&settings.pipeline, settings.include_iframes) {
            (Some(_), true) => LoaderKind::Hybrid,
            (Some(_), false) => LoaderKind::AssetPipeline,
            (None, _) => LoaderKind::Native,
        });

        let config = match kind {
            LoaderKind::Native => LoaderConfig::Native(
                NativeLoader::new(fetcher)
                    .with_asset_hostnames(settings.asset_hostnames.clone())
                    .with_iframes(settings.include_iframes),
            ),
            LoaderKind::Filesystem => {
                let asset_path = settings.asset_path.as_ref().ok_or_else(|| {
                    VizregError::Config("filesystem loader requires loader.asset_path".to_string())
                })?;
                LoaderConfig::Filesystem(
                    FilesystemLoader::new(asset_path)
                        .with_base_url(settings.base_url.clone().unwrap_or_default())
                        .with_max_file_size(settings.max_file_size_bytes),
                )
            }
            LoaderKind::AssetPipeline | LoaderKind::Hybrid => {
                let pipeline = settings.pipeline.clone().ok_or_else(|| {
                    VizregError::Config(format!("{} loader requires [loader.pipeline]", kind))
                })?;
                let loader = AssetPipelineLoader::new(pipeline)?
                    .with_max_file_size(settings.max_file_size_bytes);
                if kind == LoaderKind::Hybrid {
                    LoaderConfig::Hybrid(loader)
                } else {
                    LoaderConfig::AssetPipeline(loader)
                }
            }
        };

        debug!("Selected {} loader", kind);
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        match &self.config {
            LoaderConfig::Native(_) => "native",
            LoaderConfig::Filesystem(_) => "filesystem",
            LoaderConfig::AssetPipeline(_) => "asset_pipeline",
            LoaderConfig::Hybrid(_) => "hybrid",
            LoaderConfig::Custom(custom) => custom.name(),
        }
    }

    /// Resources attached to the build at creation
    pub async fn build_resources(&self) -> Result<Vec<Resource>> {
        match &self.config {
            LoaderConfig::Native(_) => Ok(Vec::new()),
            LoaderConfig::Filesystem(loader) => loader.build_resources().await,
            LoaderConfig::AssetPipeline(loader) | LoaderConfig::Hybrid(loader) => {
                loader.build_resources().await
            }
            LoaderConfig::Custom(custom) => custom.build_resources().await,
        }
    }

    /// Resources for one snapshot of the page's current state
    pub async fn snapshot_resources(
        &self,
        page: &dyn PageDriver,
        headers: &BTreeMap<String, String>,
    ) -> Result<Vec<Resource>> {
        match &self.config {
            LoaderConfig::Native(loader) => loader.snapshot_resources(page, headers).await,
            LoaderConfig::Filesystem(_) | LoaderConfig::AssetPipeline(_) => {
                let filter = UrlFilter::new(&page.current_url().await?, None);
                Ok(vec![root_html_resource(page, &filter).await?])
            }
            LoaderConfig::Hybrid(_) => {
                let filter = UrlFilter::new(&page.current_url().await?, None);
                let mut resources = vec![root_html_resource(page, &filter).await?];
                resources.extend(iframe_resources(page, &filter).await);
                Ok(resources)
            }
            LoaderConfig::Custom(custom) => custom.snapshot_resources(page, headers).await,
        }
    }
}
