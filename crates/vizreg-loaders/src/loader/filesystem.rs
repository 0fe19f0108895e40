//! Build resources from a directory of compiled static assets

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use vizreg_core::config::DEFAULT_MAX_FILE_SIZE_BYTES;
use vizreg_core::{Resource, Result, VizregError};

/// Extensions never uploaded: source maps and pre-compressed copies
pub(crate) const SKIP_EXTENSIONS: [&str; 2] = ["map", "gz"];

pub(crate) fn is_skipped_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SKIP_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Join a URL prefix and a relative path with exactly one `/` between them
pub(crate) fn url_join(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if prefix.is_empty() || prefix.starts_with('/') || prefix.contains("://") {
        format!("{}/{}", prefix, relative)
    } else {
        format!("/{}/{}", prefix, relative)
    }
}

pub(crate) fn guess_mimetype(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first_raw().map(str::to_string)
}

/// Every eligible file under `root`, sorted, as file-backed resources
///
/// URLs are `base_url` plus the path relative to `root`. Unreadable files are
/// logged and skipped.
pub(crate) fn resources_from_dir(
    root: &Path,
    base_url: &str,
    max_file_size_bytes: u64,
) -> Result<Vec<Resource>> {
    if !root.is_dir() {
        return Err(VizregError::Loader(format!(
            "Asset directory does not exist: {}",
            root.display()
        )));
    }

    let mut resources = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable asset entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || is_skipped_extension(entry.path()) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size > max_file_size_bytes {
            debug!(
                "Skipping {} ({} bytes exceeds {})",
                entry.path().display(),
                size,
                max_file_size_bytes
            );
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        let resource_url = url_join(base_url, &relative.join("/"));

        match Resource::from_path(&resource_url, entry.path()) {
            Ok(resource) => {
                resources.push(resource.with_optional_mimetype(guess_mimetype(entry.path())))
            }
            Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
        }
    }
    Ok(resources)
}

/// Treats an already-compiled asset directory as the build's resource set
///
/// Snapshots then carry only their root HTML; everything else was uploaded
/// once at build time.
#[derive(Debug, Clone)]
pub struct FilesystemLoader {
    asset_path: PathBuf,
    base_url: String,
    max_file_size_bytes: u64,
}

impl FilesystemLoader {
    pub fn new(asset_path: impl Into<PathBuf>) -> Self {
        Self {
            asset_path: asset_path.into(),
            base_url: String::new(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
        }
    }

    /// URL prefix the directory is served under (default: site root)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = bytes;
        self
    }

    pub fn asset_path(&self) -> &Path {
        &self.asset_path
    }

    pub async fn build_resources(&self) -> Result<Vec<Resource>> {
        let root = self.asset_path.clone();
        let base_url = self.base_url.clone();
        let max = self.max_file_size_bytes;

        let resources = tokio::task::spawn_blocking(move || resources_from_dir(&root, &base_url, max))
            .await
            .map_err(|e| VizregError::Loader(format!("Asset scan failed: {}", e)))??;

        debug!(
            "Loaded {} build resources from {}",
            resources.len(),
            self.asset_path.display()
        );
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("css")).unwrap();
        fs::create_dir_all(dir.path().join("images/icons")).unwrap();
        fs::write(dir.path().join("css/base.css"), "body { margin: 0; }").unwrap();
        fs::write(dir.path().join("css/base.css.map"), "{}").unwrap();
        fs::write(dir.path().join("app.js"), "init();").unwrap();
        fs::write(dir.path().join("app.js.gz"), [0x1f, 0x8b]).unwrap();
        fs::write(dir.path().join("images/icons/star.svg"), "<svg/>").unwrap();
        dir
    }

    #[test]
    fn test_url_join() {
        assert_eq!(url_join("", "css/a.css"), "/css/a.css");
        assert_eq!(url_join("/static/", "/css/a.css"), "/static/css/a.css");
        assert_eq!(url_join("assets", "a.css"), "/assets/a.css");
        assert_eq!(
            url_join("http://cdn.local/app", "a.css"),
            "http://cdn.local/app/a.css"
        );
    }

    #[tokio::test]
    async fn test_walks_sorted_and_skips_maps_and_gzip() {
        let dir = fixture();
        let resources = FilesystemLoader::new(dir.path())
            .build_resources()
            .await
            .unwrap();

        let urls: Vec<&str> = resources.iter().map(|r| r.resource_url()).collect();
        assert_eq!(urls, vec!["/app.js", "/css/base.css", "/images/icons/star.svg"]);

        let css = &resources[1];
        assert_eq!(css.mimetype(), Some("text/css"));
        assert_eq!(css.sha(), vizreg_core::sha256_hex(b"body { margin: 0; }"));
        assert!(css.path().is_some());
    }

    #[tokio::test]
    async fn test_base_url_prefix() {
        let dir = fixture();
        let resources = FilesystemLoader::new(dir.path())
            .with_base_url("/static")
            .build_resources()
            .await
            .unwrap();
        assert!(resources
            .iter()
            .any(|r| r.resource_url() == "/static/css/base.css"));
    }

    #[tokio::test]
    async fn test_oversized_files_skipped() {
        let dir = fixture();
        fs::write(dir.path().join("video.mp4"), vec![0u8; 64]).unwrap();

        let resources = FilesystemLoader::new(dir.path())
            .with_max_file_size(32)
            .build_resources()
            .await
            .unwrap();
        assert!(!resources.iter().any(|r| r.resource_url() == "/video.mp4"));
        assert!(resources.iter().any(|r| r.resource_url() == "/app.js"));
    }

    #[tokio::test]
    async fn test_missing_directory_is_loader_error() {
        let err = FilesystemLoader::new("/nonexistent/assets")
            .build_resources()
            .await
            .unwrap_err();
        assert!(matches!(err, VizregError::Loader(_)));
    }
}
