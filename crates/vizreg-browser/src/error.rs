//! Browser error types - re-exports the unified VizregError from vizreg-core
//!
//! Driver failures use `VizregError::Browser(String)`; a script whose result
//! does not have the documented shape is `VizregError::ScriptResult`.

pub use vizreg_core::{Result, VizregError};

pub type BrowserError = VizregError;
