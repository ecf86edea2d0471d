//! Error types.
//!
//! Two layers, two types:
//!
//! - [`Error`] surfaces infrastructure failures: binding a port, an invalid
//!   address, a CORS value that is not a legal header, a value that cannot be
//!   serialized.
//! - [`HandlerError`] is what a handler returns instead of writing a failure
//!   response itself. Dispatch turns it into a status code and a plain-text
//!   body.

use http::StatusCode;

/// A boxed, thread-safe error used as the cause of a [`HandlerError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by umi's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("serialization: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("request body is not valid json: {0}")]
    Decode(#[source] serde_json::Error),
}

/// The failure half of a handler's `Result`.
///
/// ```rust
/// use umi::{Context, HandlerError, StatusCode};
///
/// async fn get_user(ctx: Context) -> Result<(), HandlerError> {
///     let Some(id) = ctx.param("id") else {
///         return Err(ctx.fail("missing id", StatusCode::BAD_REQUEST));
///     };
///     ctx.text(format!("user {id}"));
///     Ok(())
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Respond with `status` and the cause's message as the body.
    #[error("{source}")]
    Status {
        status: StatusCode,
        #[source]
        source: BoxError,
    },

    /// Any other failure. Always answered with `500 Internal Server Error`.
    #[error("{0}")]
    Other(BoxError),
}

impl HandlerError {
    pub fn with_status(err: impl Into<BoxError>, status: StatusCode) -> Self {
        Self::Status { status, source: err.into() }
    }

    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }

    /// The status code dispatch writes for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } => *status,
            Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for HandlerError {
    fn from(e: Error) -> Self {
        Self::Other(Box::new(e))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Other(Box::new(e))
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        Self::Other(Box::new(e))
    }
}

impl From<String> for HandlerError {
    fn from(msg: String) -> Self {
        Self::Other(msg.into())
    }
}

impl From<&str> for HandlerError {
    fn from(msg: &str) -> Self {
        Self::Other(msg.into())
    }
}
