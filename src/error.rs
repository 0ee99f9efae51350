//! Error types for SonarQube API operations.

use thiserror::Error;

/// Errors that can occur while reading, writing or auditing platform configuration.
#[derive(Debug, Error)]
pub enum SonarError {
    /// Configuration is missing or incomplete.
    #[error("SonarQube configuration required: {0}")]
    ConfigMissing(String),

    /// Object not found on the platform.
    #[error("{entity_type} '{key}' not found")]
    NotFound {
        entity_type: &'static str,
        key: String,
    },

    /// The operation is not available on this edition or platform variant.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// API request failed.
    #[error("SonarQube API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("Failed to parse response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    /// Rate limited.
    #[error("Rate limited, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    /// A response or configuration document did not have the expected shape.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A portfolio parent chain loops back on itself.
    #[error("Portfolio hierarchy is cyclic at '{0}'")]
    CyclicHierarchy(String),

    /// Local file handling error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SonarError {
    /// Shorthand for a [`SonarError::NotFound`].
    pub fn not_found(entity_type: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            key: key.into(),
        }
    }

    /// HTTP status code carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { status_code, .. } => *status_code,
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Whether this error means the requested object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. }) || self.status_code() == Some(404)
    }

    /// Process exit code the command line tool reports for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ApiError { .. } | Self::HttpError(_) | Self::RateLimited { .. } => 1,
            Self::ConfigMissing(_) | Self::UrlError(_) | Self::Io(_) => 2,
            Self::NotFound { .. } => 3,
            Self::UnsupportedOperation(_) => 4,
            Self::ParseError(_) | Self::InvalidData(_) | Self::CyclicHierarchy(_) => 5,
        }
    }
}

/// Result type alias for SonarQube operations.
pub type Result<T> = core::result::Result<T, SonarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = SonarError::not_found("Project", "my-key");
        assert_eq!(err.to_string(), "Project 'my-key' not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_api_404_counts_as_not_found() {
        let err = SonarError::ApiError {
            message: "Component key 'x' not found".to_string(),
            status_code: Some(404),
        };
        assert!(err.is_not_found());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes_are_distinct_per_family() {
        assert_eq!(SonarError::ConfigMissing("token".into()).exit_code(), 2);
        assert_eq!(SonarError::UnsupportedOperation("x".into()).exit_code(), 4);
        assert_eq!(SonarError::CyclicHierarchy("p".into()).exit_code(), 5);
    }
}
