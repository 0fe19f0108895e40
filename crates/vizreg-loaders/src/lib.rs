//! # vizreg-loaders
//!
//! Decides which resources accompany a build and each snapshot.
//!
//! - [`url_filter`]: resolve references and keep only the app's own assets
//! - [`fetcher`]: out-of-band fetching through `curl`
//! - [`discovery`]: root HTML, stylesheets and images from a live page
//! - [`iframes`]: same-origin iframe documents
//! - [`loader`]: the native, filesystem, asset pipeline, hybrid and custom
//!   strategies behind one [`Loader`]

pub mod discovery;
pub mod fetcher;
pub mod iframes;
pub mod loader;
pub mod url_filter;

pub use discovery::ResourceDiscovery;
pub use fetcher::{CurlFetcher, FetchResponse, MockFetcher, ResourceFetcher};
pub use loader::{
    AssetPipelineLoader, CustomLoader, FilesystemLoader, Loader, LoaderConfig, NativeLoader,
};
pub use url_filter::UrlFilter;
