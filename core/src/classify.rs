//! Response classification.
//!
//! Maps a transport outcome to exactly one terminal classification. Only the
//! status code is inspected; headers never influence the result.

use crate::error::{ApiError, TransportError};
use crate::http::HttpResponse;

/// Terminal classification of one transport outcome.
#[derive(Debug)]
pub enum Classification {
    Success(Vec<u8>),
    Unauthorized,
    Validation(Vec<u8>),
    BadRequest,
    Unknown(u16),
    Transport(TransportError),
}

impl Classification {
    /// 401, 422 and 400 are checked before the generic 2xx range.
    pub fn from_status(status: u16, body: Vec<u8>) -> Self {
        match status {
            401 => Classification::Unauthorized,
            422 => Classification::Validation(body),
            400 => Classification::BadRequest,
            200..=299 => Classification::Success(body),
            other => Classification::Unknown(other),
        }
    }

    pub fn from_outcome(outcome: Result<HttpResponse, TransportError>) -> Self {
        match outcome {
            Ok(response) => Self::from_status(response.status, response.body),
            Err(e) => Classification::Transport(e),
        }
    }

    /// Success bytes, or the error the caller observes.
    pub fn into_result(self) -> Result<Vec<u8>, ApiError> {
        match self {
            Classification::Success(body) => Ok(body),
            Classification::Unauthorized => Err(ApiError::Unauthorized),
            Classification::Validation(body) => Err(ApiError::Validation(body)),
            Classification::BadRequest => Err(ApiError::BodyEncoding(
                "server rejected the request as malformed (400)".to_string(),
            )),
            Classification::Unknown(status) => Err(ApiError::Unknown { status }),
            Classification::Transport(e) => Err(ApiError::Transport(e)),
        }
    }
}
