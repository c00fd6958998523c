//! Kepler Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the Kepler workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`KeplerError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//! - **Types**: domain types shared by the extractor and the server
//!
//! # Example
//!
//! ```no_run
//! use kepler_common::types::AccessLevel;
//!
//! let access: AccessLevel = "Restricted".parse().unwrap();
//! assert!(access.is_restricted());
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{KeplerError, Result};
pub use types::AccessLevel;
