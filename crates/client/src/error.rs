//! Error types for FitSync API operations
//!
//! Every failure the client surfaces is normalized into [`ApiError`]: server
//! responses carry their status code and a human-readable message, transport
//! failures carry status code 0.

use thiserror::Error;

/// Errors surfaced by [`crate::ApiClient`]
#[derive(Debug, Error)]
pub enum ApiError {
    /// Server responded with a non-2xx status
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The session could not be refreshed; the client has logged out
    #[error("session refresh failed: {0}")]
    RefreshFailed(String),

    /// No server response at all (DNS, connection refused, timeout)
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be serialized or deserialized
    #[error("parse error: {0}")]
    Parse(String),

    /// Client construction or configuration failed
    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// The HTTP status associated with this error
    ///
    /// Returns the server's status for [`ApiError::Http`] and `0` for every
    /// failure that produced no server response.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Http { status, .. } => *status,
            Self::RefreshFailed(_) | Self::Network(_) | Self::Parse(_) | Self::Config(_) => 0,
        }
    }

    /// The human-readable message for this error
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether this failure should route the caller to a login screen
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::RefreshFailed(_) | Self::Http { status: 401 | 403, .. })
    }
}
