//! # vizreg-client
//!
//! Drives a build on the vizreg review service from a test suite.
//!
//! A build is created once, each page state is submitted as a snapshot, and
//! the build is finalized when the suite ends. Only resources whose content
//! hash the service has not seen are uploaded.
//!
//! ## Key Pattern
//!
//! A review service outage must never fail the functional test suite. Every
//! remote call runs inside [`ClientState::rescue_connection_failures`]: server,
//! quota, connection and timeout errors disable the client for the rest of
//! the session instead of propagating. Usage errors still propagate.

mod agent;
mod api;
mod client;
mod environment;
pub mod global;
mod http_api;
mod state;

pub use agent::AgentClient;
pub use api::{ApiCall, ApiOperation, ApiResult, BuildResponse, MockReviewApi, ReviewApi, SnapshotResponse};
pub use client::{ClientOptions, VisualClient};
pub use environment::{client_info, default_extras, environment_info, user_agent};
pub use http_api::HttpReviewApi;
pub use state::{ClientState, EnvSignals};
