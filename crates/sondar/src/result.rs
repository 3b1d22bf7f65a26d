//! Result and error types for Sondar.

use thiserror::Error;

/// Result type for Sondar operations
pub type SondarResult<T> = Result<T, SondarError>;

/// Errors that can occur in Sondar
#[derive(Debug, Error)]
pub enum SondarError {
    /// Every candidate locator was exhausted without a match
    #[error("no element found: all {candidates} candidate locator(s) exhausted, last was {last}")]
    NotFound {
        /// Number of candidates that were tried
        candidates: usize,
        /// The final candidate whose failure was surfaced
        last: String,
    },

    /// Hard backend fault surfaced outside a polling context
    #[error("backend fault: {message}")]
    Backend {
        /// Error message from the automation backend
        message: String,
    },

    /// Construction-time violation of an operation's parameters
    #[error("invalid spec: {message}")]
    InvalidSpec {
        /// What was violated
        message: String,
    },

    /// Browser launch error
    #[cfg(feature = "browser")]
    #[error("failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SondarError {
    /// Wrap an arbitrary backend failure
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// True when the error marks total locator exhaustion
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
