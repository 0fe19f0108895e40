//! Unified error types for vizreg

use thiserror::Error;

/// Failure reported by (or while talking to) the remote review service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("server error {status} on {method} {url}: {body}")]
    ServerError {
        status: u16,
        method: String,
        url: String,
        body: String,
    },

    #[error("quota exceeded ({status}) on {method} {url}: {body}")]
    PaymentRequired {
        status: u16,
        method: String,
        url: String,
        body: String,
    },

    #[error("bad request ({status}) on {method} {url}: {body}")]
    BadRequest {
        status: u16,
        method: String,
        url: String,
        body: String,
    },

    #[error("unauthorized ({status}) on {method} {url}")]
    Unauthorized {
        status: u16,
        method: String,
        url: String,
    },

    #[error("unexpected status {status} on {method} {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        method: String,
        url: String,
        body: String,
    },

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Map a non-success HTTP status to its error class
    pub fn from_status(status: u16, method: &str, url: &str, body: impl Into<String>) -> Self {
        let method = method.to_string();
        let url = url.to_string();
        let body = body.into();

        match status {
            400 | 422 => ApiError::BadRequest {
                status,
                method,
                url,
                body,
            },
            401 | 403 => ApiError::Unauthorized {
                status,
                method,
                url,
            },
            402 | 409 => ApiError::PaymentRequired {
                status,
                method,
                url,
                body,
            },
            500..=599 => ApiError::ServerError {
                status,
                method,
                url,
                body,
            },
            _ => ApiError::UnexpectedStatus {
                status,
                method,
                url,
                body,
            },
        }
    }

    /// Errors that indicate the review service is unreachable or refusing work.
    ///
    /// These are absorbed by the client's rescue policy, which disables the
    /// client for the rest of the session.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            ApiError::ServerError { .. }
                | ApiError::PaymentRequired { .. }
                | ApiError::ConnectionFailed(_)
                | ApiError::Timeout(_)
        )
    }

    pub fn is_bad_request(&self) -> bool {
        matches!(self, ApiError::BadRequest { .. })
    }
}

/// Unified error type for all vizreg operations
#[derive(Error, Debug)]
pub enum VizregError {
    // Usage errors
    #[error("no build has been initialized")]
    BuildNotInitialized,

    #[error("build {0} has already been finalized")]
    BuildAlreadyFinalized(String),

    #[error("a snapshot name is required")]
    MissingSnapshotName,

    #[error("configuration error: {0}")]
    Config(String),

    // Remote API errors
    #[error(transparent)]
    Api(#[from] ApiError),

    // Page driver errors
    #[error("browser error: {0}")]
    Browser(String),

    #[error("script returned an unexpected shape for {script}: {message}")]
    ScriptResult { script: String, message: String },

    // Resource errors
    #[error("content unavailable for resource {0}")]
    ResourceUnavailable(String),

    #[error("loader error: {0}")]
    Loader(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VizregError {
    /// True when this error is a connection-class API failure
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, VizregError::Api(e) if e.is_connection_failure())
    }
}

/// Result type alias using VizregError
pub type Result<T> = std::result::Result<T, VizregError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ApiError::from_status(500, "POST", "/builds", ""),
            ApiError::ServerError { .. }
        ));
        assert!(matches!(
            ApiError::from_status(503, "POST", "/builds", ""),
            ApiError::ServerError { .. }
        ));
        assert!(matches!(
            ApiError::from_status(402, "POST", "/builds", ""),
            ApiError::PaymentRequired { .. }
        ));
        assert!(matches!(
            ApiError::from_status(409, "POST", "/builds", ""),
            ApiError::PaymentRequired { .. }
        ));
        assert!(ApiError::from_status(400, "POST", "/snapshots", "").is_bad_request());
        assert!(matches!(
            ApiError::from_status(401, "GET", "/", ""),
            ApiError::Unauthorized { .. }
        ));
        assert!(matches!(
            ApiError::from_status(418, "GET", "/", ""),
            ApiError::UnexpectedStatus { status: 418, .. }
        ));
    }

    #[test]
    fn test_connection_failure_class() {
        assert!(ApiError::ConnectionFailed("refused".into()).is_connection_failure());
        assert!(ApiError::Timeout("30s".into()).is_connection_failure());
        assert!(ApiError::from_status(502, "POST", "/", "").is_connection_failure());
        assert!(ApiError::from_status(402, "POST", "/", "").is_connection_failure());

        assert!(!ApiError::from_status(400, "POST", "/", "").is_connection_failure());
        assert!(!ApiError::from_status(401, "POST", "/", "").is_connection_failure());
        assert!(!ApiError::InvalidResponse("no id".into()).is_connection_failure());
    }

    #[test]
    fn test_wrapped_connection_failure() {
        let err: VizregError = ApiError::Timeout("slow".into()).into();
        assert!(err.is_connection_failure());
        assert!(!VizregError::BuildNotInitialized.is_connection_failure());
    }
}
