//! Resource discovery against a live page
//!
//! Produces the root HTML document plus every same-app stylesheet and image
//! the page references. Individual sub-resources that cannot be fetched are
//! logged and skipped; they never fail the pass.

use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;
use tracing::{debug, warn};
use vizreg_browser::scripts::{BACKGROUND_IMAGES, ROOT_HTML, STYLESHEET_URLS};
use vizreg_browser::PageDriver;
use vizreg_core::{Resource, Result};

use crate::fetcher::ResourceFetcher;
use crate::url_filter::UrlFilter;

fn background_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"url\(["']?(.*?)["']?\)"#).expect("background url pattern compiles")
    })
}

/// Candidate URLs of an `srcset` attribute
pub fn parse_srcset(srcset: &str) -> Vec<String> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Every `url(...)` in a computed `background-image` value, quotes stripped
pub fn parse_background_urls(value: &str) -> Vec<String> {
    background_url_regex()
        .captures_iter(value)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// The document's outer HTML, registered under the page path
pub async fn root_html_resource(driver: &dyn PageDriver, filter: &UrlFilter) -> Result<Resource> {
    let html = if driver.capability().can_evaluate() {
        let value = driver.evaluate(&ROOT_HTML.source()).await?;
        ROOT_HTML.decode::<String>(value)?
    } else {
        driver.html().await?
    };
    Ok(Resource::root_html(filter.page_path(), html))
}

/// Discovers the resources a snapshot of the current page needs
pub struct ResourceDiscovery<'a> {
    driver: &'a dyn PageDriver,
    fetcher: &'a dyn ResourceFetcher,
    headers: &'a BTreeMap<String, String>,
    filter: UrlFilter,
}

impl<'a> ResourceDiscovery<'a> {
    /// Reads the page's current URL once; all references resolve against it
    pub async fn new(
        driver: &'a dyn PageDriver,
        fetcher: &'a dyn ResourceFetcher,
        headers: &'a BTreeMap<String, String>,
        asset_hostnames: Option<&[String]>,
    ) -> Result<Self> {
        let current_url = driver.current_url().await?;
        Ok(Self {
            driver,
            fetcher,
            headers,
            filter: UrlFilter::new(&current_url, asset_hostnames),
        })
    }

    pub fn filter(&self) -> &UrlFilter {
        &self.filter
    }

    /// Root HTML, stylesheets, then images
    pub async fn discover(&self) -> Result<Vec<Resource>> {
        let mut resources = vec![self.root_html().await?];
        resources.extend(self.css_resources().await?);
        resources.extend(self.image_resources().await?);
        Ok(resources)
    }

    pub async fn root_html(&self) -> Result<Resource> {
        root_html_resource(self.driver, &self.filter).await
    }

    /// Every linked and `@import`ed stylesheet, as `text/css`
    pub async fn css_resources(&self) -> Result<Vec<Resource>> {
        if !self.driver.capability().can_evaluate() {
            debug!("Driver cannot evaluate scripts, skipping stylesheet discovery");
            return Ok(Vec::new());
        }

        let value = self.driver.evaluate(&STYLESHEET_URLS.source()).await?;
        let urls: Vec<String> = STYLESHEET_URLS.decode(value)?;

        let mut seen = HashSet::new();
        let mut resources = Vec::new();
        for raw in urls {
            let Some(url) = self.filter.accept(&raw) else {
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }
            if let Some(response) = self.fetch(&url).await {
                resources.push(
                    Resource::from_content(self.filter.resource_url(&url), response.body)
                        .with_mimetype("text/css"),
                );
            }
        }
        Ok(resources)
    }

    /// Images from `<img src>`, `<img srcset>` and computed backgrounds
    pub async fn image_resources(&self) -> Result<Vec<Resource>> {
        let mut raw_urls: Vec<String> = Vec::new();

        let srcs = self.driver.element_attributes("img", "src").await?;
        raw_urls.extend(srcs.into_iter().flatten());

        let srcsets = self.driver.element_attributes("img", "srcset").await?;
        for srcset in srcsets.into_iter().flatten() {
            raw_urls.extend(parse_srcset(&srcset));
        }

        if self.driver.capability().can_evaluate() {
            let value = self.driver.evaluate(&BACKGROUND_IMAGES.source()).await?;
            let backgrounds: Vec<String> = BACKGROUND_IMAGES.decode(value)?;
            for background in backgrounds {
                raw_urls.extend(parse_background_urls(&background));
            }
        } else {
            debug!("Driver cannot evaluate scripts, skipping background images");
        }

        let mut seen = HashSet::new();
        let mut resources = Vec::new();
        for raw in raw_urls {
            let Some(url) = self.filter.accept(&raw) else {
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }
            if let Some(response) = self.fetch(&url).await {
                resources.push(
                    Resource::from_content(self.filter.resource_url(&url), response.body)
                        .with_optional_mimetype(response.content_type),
                );
            }
        }
        Ok(resources)
    }

    async fn fetch(&self, url: &str) -> Option<crate::fetcher::FetchResponse> {
        let response = self.fetcher.fetch(url, self.headers).await;
        if response.is_none() {
            warn!("Failed to fetch page resource, skipping: {}", url);
        }
        response
    }
}
