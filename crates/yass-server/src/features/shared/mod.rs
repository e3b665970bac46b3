//! Shared utilities for feature modules
//!
//! - **extract**: JSON-or-form body extractor
//! - **validation**: Input validation utilities

pub mod extract;
pub mod validation;

pub use extract::JsonOrForm;
pub use validation::{is_safe_component, validate_source_url, UrlValidationError};
