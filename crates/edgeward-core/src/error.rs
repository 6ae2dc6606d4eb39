use thiserror::Error;

/// Result type alias for edgeward operations
pub type Result<T> = std::result::Result<T, EdgeError>;

/// Errors that can occur while reconciling against the edge platform
#[derive(Error, Debug)]
pub enum EdgeError {
    /// Authentication failed - invalid or missing API token
    #[error("authentication failed: invalid API token")]
    Unauthorized,

    /// Rate limit exceeded
    #[error("rate limit exceeded, retry after {retry_after:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying
        retry_after: Option<u64>,
    },

    /// Resource not found
    #[error("resource not found: {resource}")]
    NotFound {
        /// Description of the resource that wasn't found
        resource: String,
    },

    /// The remote side rejected a change because its content no longer
    /// matches what the change assumed
    #[error("conflict ({code}): {message}")]
    Conflict {
        /// HTTP status code (client-error class)
        code: u16,
        /// Error message from the API
        message: String,
    },

    /// API returned an error response
    #[error("API error ({code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Error message from the API
        message: String,
    },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Request timed out
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection failed
    #[error("connection failed: {0}")]
    Connection(String),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Identifier is not an address, network, country code or AS number
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persisted state is inconsistent
    #[error("state error: {0}")]
    State(String),

    /// A retried operation kept failing
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Name of the operation that was retried
        operation: String,
        /// Number of attempts made
        attempts: u32,
        /// Last error observed
        #[source]
        source: Box<EdgeError>,
    },

    /// Some branches of a concurrent commit failed
    #[error("{failed} of {total} concurrent updates failed, first: {source}")]
    PartialCommit {
        /// Number of failed branches
        failed: usize,
        /// Number of branches started
        total: usize,
        /// First failure observed
        #[source]
        source: Box<EdgeError>,
    },
}

impl EdgeError {
    /// Returns true if the error is transient and the request can be retried
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Connection(_) | Self::Http(_) => {
                true
            }
            Self::Api { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// Returns true if the remote side rejected a change as inconsistent
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true if the error is due to authentication
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Returns the HTTP status code if this is an API error
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::RateLimited { .. } => Some(429),
            Self::NotFound { .. } => Some(404),
            Self::Conflict { code, .. } | Self::Api { code, .. } => Some(*code),
            Self::RetriesExhausted { source, .. } | Self::PartialCommit { source, .. } => {
                source.status_code()
            }
            _ => None,
        }
    }

    /// Aggregate the failures of a set of concurrent branches
    ///
    /// Returns `None` when no branch failed.
    #[must_use]
    pub fn aggregate(total: usize, mut errors: Vec<Self>) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        let failed = errors.len();
        let first = errors.swap_remove(0);
        Some(Self::PartialCommit {
            failed,
            total,
            source: Box::new(first),
        })
    }
}
