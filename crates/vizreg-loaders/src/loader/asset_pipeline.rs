//! Build resources from an asset pipeline's compiled output

use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};
use vizreg_core::config::DEFAULT_MAX_FILE_SIZE_BYTES;
use vizreg_core::{PipelineSettings, Resource, Result, VizregError};

use super::filesystem::{guess_mimetype, is_skipped_extension, resources_from_dir, url_join};

fn has_glob_meta(entry: &str) -> bool {
    entry.contains(|c| matches!(c, '*' | '?' | '['))
}

/// Loads the declared precompile list, then any public files not already covered
#[derive(Debug, Clone)]
pub struct AssetPipelineLoader {
    settings: PipelineSettings,
    ignore: Vec<glob::Pattern>,
    max_file_size_bytes: u64,
}

impl AssetPipelineLoader {
    /// Fails on an invalid `ignore_paths` pattern
    pub fn new(settings: PipelineSettings) -> Result<Self> {
        let ignore = settings
            .ignore_paths
            .iter()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| VizregError::Config(format!("Invalid ignore pattern {}: {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            settings,
            ignore,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
        })
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = bytes;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn is_ignored(&self, resource_url: &str) -> bool {
        self.ignore.iter().any(|p| p.matches(resource_url))
    }

    pub async fn build_resources(&self) -> Result<Vec<Resource>> {
        let loader = self.clone();
        tokio::task::spawn_blocking(move || loader.scan())
            .await
            .map_err(|e| VizregError::Loader(format!("Asset pipeline scan failed: {}", e)))?
    }

    /// Logical paths named by one precompile entry, relative to the assets root
    fn expand(&self, entry: &str) -> Vec<String> {
        if !has_glob_meta(entry) {
            return vec![entry.trim_start_matches('/').to_string()];
        }

        let root = &self.settings.assets_root;
        let pattern = root.join(entry);
        let Ok(paths) = glob::glob(&pattern.to_string_lossy()) else {
            warn!("Invalid precompile pattern: {}", entry);
            return Vec::new();
        };

        let mut logical: Vec<String> = paths
            .filter_map(|p| p.ok())
            .filter(|p| p.is_file())
            .filter_map(|p| relative_url_path(root, &p))
            .collect();
        logical.sort();
        logical
    }

    fn scan(&self) -> Result<Vec<Resource>> {
        let root = &self.settings.assets_root;
        let mut loaded: HashSet<String> = HashSet::new();
        let mut resources = Vec::new();

        for entry in &self.settings.precompile {
            for logical in self.expand(entry) {
                let path = root.join(&logical);
                if is_skipped_extension(&path) {
                    continue;
                }

                let size = match std::fs::metadata(&path) {
                    Ok(meta) if meta.is_file() => meta.len(),
                    _ => {
                        warn!("Precompiled asset not found, skipping: {}", path.display());
                        continue;
                    }
                };
                if size > self.max_file_size_bytes {
                    debug!("Skipping oversized asset {}", path.display());
                    continue;
                }

                let resource_url = url_join(&self.settings.url_prefix, &logical);
                if self.is_ignored(&resource_url) || !loaded.insert(resource_url.clone()) {
                    continue;
                }

                match Resource::from_path(&resource_url, &path) {
                    Ok(resource) => {
                        resources.push(resource.with_optional_mimetype(guess_mimetype(&path)))
                    }
                    Err(e) => warn!("Skipping {}: {}", path.display(), e),
                }
            }
        }

        if let Some(public_dir) = &self.settings.public_dir {
            let public = resources_from_dir(public_dir, "", self.max_file_size_bytes)?;
            resources.extend(public.into_iter().filter(|r| {
                !loaded.contains(r.resource_url()) && !self.is_ignored(r.resource_url())
            }));
        }

        debug!("Loaded {} asset pipeline resources", resources.len());
        Ok(resources)
    }
}

fn relative_url_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        settings: PipelineSettings,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("public/assets");
        let public = dir.path().join("public");
        fs::create_dir_all(assets.join("vendor")).unwrap();
        fs::write(assets.join("application.css"), ".app {}").unwrap();
        fs::write(assets.join("application.js"), "app();").unwrap();
        fs::write(assets.join("application.js.map"), "{}").unwrap();
        fs::write(assets.join("vendor/a.js"), "a();").unwrap();
        fs::write(assets.join("vendor/b.js"), "b();").unwrap();
        fs::write(public.join("favicon.ico"), [0u8, 1, 2]).unwrap();
        fs::write(public.join("robots.txt"), "User-agent: *").unwrap();

        let settings = PipelineSettings {
            assets_root: assets,
            precompile: vec![
                "application.css".to_string(),
                "application.js".to_string(),
                "vendor/*.js".to_string(),
                "missing.css".to_string(),
            ],
            url_prefix: "/assets".to_string(),
            public_dir: Some(public),
            ignore_paths: Vec::new(),
        };
        Fixture {
            _dir: dir,
            settings,
        }
    }

    fn urls(resources: &[Resource]) -> Vec<&str> {
        resources.iter().map(|r| r.resource_url()).collect()
    }

    #[tokio::test]
    async fn test_precompile_then_public_without_duplicates() {
        let fixture = fixture();
        let resources = AssetPipelineLoader::new(fixture.settings)
            .unwrap()
            .build_resources()
            .await
            .unwrap();

        let urls = urls(&resources);
        assert_eq!(
            &urls[..4],
            &[
                "/assets/application.css",
                "/assets/application.js",
                "/assets/vendor/a.js",
                "/assets/vendor/b.js",
            ]
        );
        assert!(urls.contains(&"/favicon.ico"));
        assert!(urls.contains(&"/robots.txt"));
        // Already loaded through the precompile list
        assert_eq!(
            urls.iter()
                .filter(|u| **u == "/assets/application.css")
                .count(),
            1
        );
        assert!(!urls.iter().any(|u| u.ends_with(".map")));
    }

    #[tokio::test]
    async fn test_ignore_paths() {
        let mut fixture = fixture();
        fixture.settings.ignore_paths = vec!["/assets/vendor/*".to_string(), "/robots.txt".to_string()];

        let resources = AssetPipelineLoader::new(fixture.settings)
            .unwrap()
            .build_resources()
            .await
            .unwrap();

        let urls = urls(&resources);
        assert!(!urls.iter().any(|u| u.starts_with("/assets/vendor/")));
        assert!(!urls.contains(&"/robots.txt"));
        assert!(urls.contains(&"/favicon.ico"));
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let mut fixture = fixture();
        fixture.settings.ignore_paths = vec!["[".to_string()];
        let err = AssetPipelineLoader::new(fixture.settings).unwrap_err();
        assert!(matches!(err, VizregError::Config(_)));
    }
}
