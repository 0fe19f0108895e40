//! Page drivers for vizreg resource discovery
//!
//! Discovery never touches a browser directly. It is written against the
//! [`PageDriver`] trait, which a headless Chrome [`BrowserSession`] implements
//! and which tests implement with canned responses.
//!
//! # Example
//!
//! ```no_run
//! use vizreg_browser::{BrowserSession, PageDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = BrowserSession::launch().await?;
//!     session.navigate("http://localhost:3000/").await?;
//!
//!     let html = session.html().await?;
//!     println!("{} bytes of HTML", html.len());
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Requirements
//!
//! - Chrome or Chromium installed for [`BrowserSession::launch`]
//!
//! # Modules
//!
//! - [`driver`]: the [`PageDriver`] trait and [`DriverCapability`]
//! - [`scripts`]: in-page discovery scripts and their result shapes
//! - [`browser`]: headless Chrome session
//! - [`error`]: error re-exports

pub mod browser;
pub mod driver;
pub mod error;
pub mod scripts;

pub use browser::{BrowserConfig, BrowserSession};
pub use driver::{DriverCapability, MockPageDriver, PageDriver};
pub use error::{BrowserError, Result};
pub use scripts::{FrameDocument, PageScript};
