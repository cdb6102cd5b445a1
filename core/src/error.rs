//! Error types for the API client.
//!
//! # Design
//! `ApiError` is the closed set of outcomes a caller can observe besides a
//! decoded value. Transport-level failures (no HTTP response at all) are
//! described separately by `TransportError` so transport implementations do
//! not need to know about the classification taxonomy.

use std::time::Duration;

/// Errors returned by every client operation.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// `base_url + path` is not a parseable absolute URL. No transport call
    /// was made.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The request body could not be produced, or the server answered 400.
    #[error("request body could not be encoded: {0}")]
    BodyEncoding(String),

    /// A 2xx body could not be decoded into the requested type.
    #[error("response decoding failed: {0}")]
    Decoding(#[source] serde_json::Error),

    /// No HTTP response was received.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The server answered 401.
    #[error("unauthorized")]
    Unauthorized,

    /// The server answered 422. The raw body is kept for field-level
    /// messages.
    #[error("validation failed ({} bytes)", .0.len())]
    Validation(Vec<u8>),

    /// Any status the classifier does not special-case.
    #[error("unexpected response status {status}")]
    Unknown { status: u16 },
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// The raw 422 body, if this is a validation error.
    pub fn validation_body(&self) -> Option<&[u8]> {
        match self {
            ApiError::Validation(body) => Some(body),
            _ => None,
        }
    }
}

/// Failures raised by an `HttpTransport` before any status code is known.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The background task running the request was cancelled or panicked.
    #[error("transport task failed: {0}")]
    Join(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;
