//! YASS Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the YASS workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`YassError`] and the [`Result`] alias
//! - **Checksums**: streaming SHA-256 of published artifacts
//! - **Types**: job kinds, job states, artifact references and error
//!   descriptors as they appear on the wire
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//!
//! # Example
//!
//! ```no_run
//! use yass_common::checksum::sha256_file;
//!
//! fn fingerprint(path: &str) -> yass_common::Result<()> {
//!     let digest = sha256_file(path)?;
//!     tracing::info!(%digest, "artifact fingerprint");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, YassError};
