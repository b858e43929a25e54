//! Error types for the Admin API client.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Admin API calls.
pub type AdminResult<T> = Result<T, AdminError>;

/// Errors that can occur talking to the Admin API.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("invalid api base url {url}: {reason}")]
    InvalidBase { url: String, reason: String },

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error("connection to {authority} failed: {source}")]
    Connect {
        authority: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("request build error: {0}")]
    Request(#[from] http::Error),

    #[error("{method} {path} timed out after {timeout:?}")]
    Timeout {
        method: String,
        path: String,
        timeout: Duration,
    },

    #[error("{method} {path} returned {status}: {message}")]
    Status {
        method: String,
        path: String,
        status: u16,
        message: String,
    },

    #[error("malformed response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("service {service} has an unusable traffic split: {source}")]
    Split {
        service: String,
        #[source]
        source: gaeship_core::AllocationError,
    },
}
