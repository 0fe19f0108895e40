//! # vizreg-core
//!
//! Core types for the vizreg visual regression client.
//!
//! A page under test is captured as a set of content-addressed [`Resource`]s:
//! one root HTML document plus the stylesheets, images and frames it needs.
//! The review service deduplicates by content hash, so only bytes it has never
//! seen are uploaded.
//!
//! - [`resource`]: resources and the sha-keyed [`ResourceIndex`]
//! - [`types`]: builds, snapshots and [`SnapshotOptions`]
//! - [`config`]: `.vizreg.toml` + environment configuration
//! - [`error`]: [`VizregError`] and the remote [`ApiError`] taxonomy

pub mod config;
mod error;
pub mod resource;
pub mod types;

pub use config::{LoaderKind, LoaderSettings, PipelineSettings, VizregConfig};
pub use error::{ApiError, Result, VizregError};
pub use resource::{sha256_hex, Resource, ResourceDescriptor, ResourceIndex};
pub use types::{Build, Snapshot, SnapshotOptions};
