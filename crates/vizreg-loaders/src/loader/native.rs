//! Browser-driven discovery

use std::collections::BTreeMap;
use std::sync::Arc;
use vizreg_browser::PageDriver;
use vizreg_core::{Resource, Result};

use crate::discovery::ResourceDiscovery;
use crate::fetcher::ResourceFetcher;
use crate::iframes::iframe_resources;

/// Discovers everything from the live page; nothing is known at build time
#[derive(Clone)]
pub struct NativeLoader {
    fetcher: Arc<dyn ResourceFetcher>,
    asset_hostnames: Option<Vec<String>>,
    include_iframes: bool,
}

impl NativeLoader {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            asset_hostnames: None,
            include_iframes: false,
        }
    }

    pub fn with_asset_hostnames(mut self, hosts: Option<Vec<String>>) -> Self {
        self.asset_hostnames = hosts;
        self
    }

    pub fn with_iframes(mut self, include: bool) -> Self {
        self.include_iframes = include;
        self
    }

    pub async fn snapshot_resources(
        &self,
        page: &dyn PageDriver,
        headers: &BTreeMap<String, String>,
    ) -> Result<Vec<Resource>> {
        let discovery = ResourceDiscovery::new(
            page,
            self.fetcher.as_ref(),
            headers,
            self.asset_hostnames.as_deref(),
        )
        .await?;

        let mut resources = discovery.discover().await?;
        if self.include_iframes {
            resources.extend(iframe_resources(page, discovery.filter()).await);
        }
        Ok(resources)
    }
}
