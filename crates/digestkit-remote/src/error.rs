//! Error types for remote dictionary requests.

/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Remote request error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP transport error (connect, TLS, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl Error {
    /// Returns true if retrying the same request could succeed.
    ///
    /// Client errors (4xx) and malformed documents are permanent; transport
    /// failures and server errors are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Json(_) | Self::InvalidConfig(_) | Self::UrlError(_) => false,
        }
    }
}
