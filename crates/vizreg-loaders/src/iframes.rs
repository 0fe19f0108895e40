//! Same-origin iframe capture

use tracing::debug;
use vizreg_browser::scripts::{FrameDocument, IFRAME_DOCUMENTS};
use vizreg_browser::PageDriver;
use vizreg_core::Resource;

use crate::url_filter::UrlFilter;

/// HTML documents of the page's same-origin iframes, keyed by frame path
///
/// Cross-origin frames, unreadable frame documents and drivers that cannot
/// evaluate scripts all yield nothing rather than an error.
pub async fn iframe_resources(driver: &dyn PageDriver, filter: &UrlFilter) -> Vec<Resource> {
    if !driver.capability().can_evaluate() {
        return Vec::new();
    }

    let frames: Vec<FrameDocument> = match driver.evaluate(&IFRAME_DOCUMENTS.source()).await {
        Ok(value) => match IFRAME_DOCUMENTS.decode(value) {
            Ok(frames) => frames,
            Err(e) => {
                debug!("Ignoring iframe capture result: {}", e);
                return Vec::new();
            }
        },
        Err(e) => {
            debug!("Iframe capture unsupported here: {}", e);
            return Vec::new();
        }
    };

    let mut resources = Vec::new();
    for frame in frames {
        let Some(resolved) = filter.resolve(&frame.src) else {
            continue;
        };
        let resolved = resolved.to_string();
        if !filter.is_same_origin(&resolved) {
            debug!("Skipping cross-origin iframe {}", frame.src);
            continue;
        }
        let Some(html) = frame.html else {
            continue;
        };
        resources.push(
            Resource::from_content(filter.resource_url(&resolved), html).with_mimetype("text/html"),
        );
    }
    resources
}
