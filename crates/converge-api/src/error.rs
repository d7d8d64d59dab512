//! Remote API errors

/// Errors raised by a remote API call
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request never produced a response
    #[error("{method} {path} failed: {source}")]
    Transport {
        method: String,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response with a non-success status
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        status: u16,
        method: String,
        path: String,
        body: String,
    },

    /// Response body did not match the expected shape
    #[error("failed to decode response of {method} {path}: {message}")]
    Decode {
        method: String,
        path: String,
        message: String,
    },

    /// Request body could not be encoded
    #[error("failed to encode request for {path}: {message}")]
    Encode { path: String, message: String },

    /// Change-set listing has no HEAD entry
    #[error("remote reported no HEAD change set")]
    NoHeadChangeSet,

    /// Client could not be built from its configuration
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// Create a status error
    pub fn status(
        status: u16,
        method: impl Into<String>,
        path: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::Status {
            status,
            method: method.into(),
            path: path.into(),
            body: body.into(),
        }
    }

    /// Create a 404 status error
    pub fn not_found(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::status(404, method, path, "not found")
    }

    /// Whether this is a genuine "not found" response
    ///
    /// Only a 404 status counts. Transport failures and other statuses are
    /// never treated as absence.
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    /// HTTP status, when a response was received
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for remote calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Turn a 404 into `Ok(None)` and pass every other outcome through
pub fn optional<T>(result: ApiResult<T>) -> ApiResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
