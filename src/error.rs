//! Error types for the rudder strategy selector.
//!
//! Decisions themselves are infallible: every malformed input degrades to
//! the rule-based fallback path rather than surfacing an error. Only the
//! explicit persistence entry points return `Result`.

use thiserror::Error;

/// The primary error type for rudder operations.
#[derive(Error, Debug)]
pub enum RudderError {
    /// I/O error while reading or writing the cache file
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Configuration error (missing path, inconsistent options, etc.)
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl RudderError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias for rudder operations.
pub type Result<T> = std::result::Result<T, RudderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RudderError::config("no cache path configured");
        assert_eq!(
            err.to_string(),
            "Configuration error: no cache path configured"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RudderError = io.into();
        assert!(matches!(err, RudderError::Io { .. }));
    }
}
