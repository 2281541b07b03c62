//! Crate-wide error kinds.
//!
//! Every component reports failures through [`Error`]. The HTTP layer turns
//! them into status codes with [`Error::status`]; anything sent back to a
//! client goes through [`Error::public_message`] so internal details never
//! leave the process.

use crate::http::response::StatusCode;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Missing or malformed input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown service, operation, profile or preset
    #[error("not found: {0}")]
    NotFound(String),

    /// Name already registered
    #[error("already exists: {0}")]
    Duplicate(String),

    /// A fixed capacity has been reached
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Malformed HTTP message, XML body or digest header
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// Credential mismatch. Carries no detail on purpose.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Unrecognised transfer-coding, method or media type
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Allocation or persistence failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status a client sees for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidArgument(_) | Error::ParseFailure(_) => StatusCode::BadRequest,
            Error::NotFound(_) | Error::Duplicate(_) => StatusCode::NotFound,
            Error::AuthenticationFailed => StatusCode::Unauthorized,
            Error::Unsupported(_) => StatusCode::NotImplemented,
            Error::ResourceExhausted(_) | Error::Internal(_) => StatusCode::InternalServerError,
        }
    }

    /// Text that is safe to put in a response body.
    pub fn public_message(&self) -> String {
        match self {
            Error::Internal(_) => "Internal server error".to_string(),
            Error::AuthenticationFailed => "Authentication required".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(e.to_string())
    }
}
