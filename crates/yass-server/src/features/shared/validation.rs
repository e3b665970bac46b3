//! Shared validation utilities
//!
//! Checks applied to request input before anything is enqueued or opened.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("{field_name} is required and cannot be empty")]
    Required { field_name: String },

    #[error("{field_name} is not a valid URL")]
    Malformed { field_name: String },

    #[error("{field_name} must use http or https")]
    UnsupportedScheme { field_name: String },

    #[error("{field_name} has no host")]
    MissingHost { field_name: String },
}

/// Validate a remote media URL
///
/// # Rules
/// - Must not be empty
/// - Must parse as an absolute URL
/// - Scheme must be `http` or `https`
/// - Must name a host
pub fn validate_source_url(raw: &str, field_name: &str) -> Result<Url, UrlValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlValidationError::Required {
            field_name: field_name.to_string(),
        });
    }

    let url = Url::parse(raw).map_err(|_| UrlValidationError::Malformed {
        field_name: field_name.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlValidationError::UnsupportedScheme {
            field_name: field_name.to_string(),
        });
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlValidationError::MissingHost {
            field_name: field_name.to_string(),
        });
    }

    Ok(url)
}

/// A single normal path component: no separators, no `.`/`..`, no leading dot
#[inline]
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_source_url() {
        let url = validate_source_url("https://www.youtube.com/watch?v=abc", "source_url");
        assert!(url.is_ok());
    }

    #[test]
    fn test_empty_source_url() {
        assert!(matches!(
            validate_source_url("   ", "source_url"),
            Err(UrlValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_malformed_source_url() {
        assert!(matches!(
            validate_source_url("not a url", "source_url"),
            Err(UrlValidationError::Malformed { .. })
        ));
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        assert!(matches!(
            validate_source_url("file:///etc/passwd", "source_url"),
            Err(UrlValidationError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            validate_source_url("ftp://example.com/a.mp3", "source_url"),
            Err(UrlValidationError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn test_error_message_names_field() {
        let err = validate_source_url("", "source_url").unwrap_err();
        assert_eq!(err.to_string(), "source_url is required and cannot be empty");
    }

    #[test]
    fn test_safe_component() {
        assert!(is_safe_component("input"));
        assert!(is_safe_component("my song (live)"));
        assert!(!is_safe_component(""));
        assert!(!is_safe_component(".."));
        assert!(!is_safe_component(".hidden"));
        assert!(!is_safe_component("a/b"));
        assert!(!is_safe_component("a\\b"));
    }
}
