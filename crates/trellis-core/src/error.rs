//! The canonical error envelope.
//!
//! Every failed response leaves the server as an [`HttpError`] serialized to
//! `{message, code, status, trace_id, data?}`. Handlers return [`ApiError`],
//! which is either an envelope (passed through untouched apart from the
//! trace id) or a bare error (wrapped in a 500 `SERVER_ERROR` envelope).

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::validate::ValidationErrors;
use crate::TraceId;

/// Stable machine-readable error codes used by the toolkit itself.
pub mod codes {
    /// Default code for unexpected failures.
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
    /// Declarative validation rules failed.
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    /// No route matches the request path.
    pub const ROUTE_NOT_FOUND: &str = "ROUTE_NOT_FOUND";
    /// A route matches the path but not the method.
    pub const METHOD_NOT_ALLOWED: &str = "METHOD_NOT_ALLOWED";
    /// The query string could not be decoded.
    pub const ERROR_PARSING_QUERY_PARAMS: &str = "ERROR_PARSING_QUERY_PARAMS";
    /// The request headers could not be decoded.
    pub const ERROR_PARSING_HEADER: &str = "ERROR_PARSING_HEADER";
    /// The request body could not be decoded.
    pub const ERROR_PARSING_BODY: &str = "ERROR_PARSING_BODY";
    /// The request body has an unsupported content type.
    pub const ERR_INVALID_CONTENT_TYPE: &str = "ERR_INVALID_CONTENT_TYPE";
    /// A multipart file could not be retrieved.
    pub const ERROR_RETRIEVE_FILE: &str = "ERROR_RETRIEVE_FILE";
    /// The request body exceeds the configured size limit.
    pub const ERROR_PAYLOAD_TOO_LARGE: &str = "ERROR_PAYLOAD_TOO_LARGE";
}

/// The error envelope returned to clients.
///
/// Construct with [`HttpError::new`] (500 / `SERVER_ERROR`) or one of the
/// status shortcuts, each taking `(message, code)`.
///
/// # Example
///
/// ```
/// use trellis_core::HttpError;
///
/// let err = HttpError::bad_request("bad age", "BAD_AGE");
/// assert_eq!(err.status, 400);
/// assert_eq!(err.to_string(), "bad age");
/// ```
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub struct HttpError {
    /// Human-readable message.
    pub message: String,
    /// Stable machine-readable tag.
    pub code: String,
    /// HTTP status of the response.
    pub status: u16,
    /// Trace id attached by the pipeline before the envelope is written.
    #[serde(default)]
    pub trace_id: String,
    /// Optional diagnostic payload, typically validation failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl HttpError {
    /// Creates a 500 envelope with code `SERVER_ERROR`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, message, codes::SERVER_ERROR)
    }

    /// Creates an envelope with an explicit status and code.
    #[must_use]
    pub fn with_status(
        status: StatusCode,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            status: status.as_u16(),
            trace_id: String::new(),
            data: None,
        }
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, message, code)
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, message, code)
    }

    /// 403 Forbidden.
    #[must_use]
    pub fn forbidden(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::with_status(StatusCode::FORBIDDEN, message, code)
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, message, code)
    }

    /// 405 Method Not Allowed.
    #[must_use]
    pub fn method_not_allowed(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::with_status(StatusCode::METHOD_NOT_ALLOWED, message, code)
    }

    /// 422 Unprocessable Entity.
    #[must_use]
    pub fn unprocessable(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNPROCESSABLE_ENTITY, message, code)
    }

    /// 429 Too Many Requests.
    #[must_use]
    pub fn too_many_requests(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::with_status(StatusCode::TOO_MANY_REQUESTS, message, code)
    }

    /// 500 Internal Server Error with a caller-chosen code.
    #[must_use]
    pub fn internal(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, message, code)
    }

    /// 422 `VALIDATION_ERROR` carrying the failure list as `data`.
    #[must_use]
    pub fn validation(errors: &ValidationErrors) -> Self {
        Self::unprocessable("validation error", codes::VALIDATION_ERROR)
            .with_data(errors.to_value())
    }

    /// Attaches a diagnostic payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attaches the trace id, replacing any previous one.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: &TraceId) -> Self {
        self.trace_id = trace_id.as_str().to_string();
        self
    }

    /// Returns the HTTP status, falling back to 500 for out-of-range values.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Returns `true` for 5xx envelopes.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

/// The error half of a handler result.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A ready-made envelope; passed through unchanged except for the trace id.
    #[error(transparent)]
    Envelope(HttpError),

    /// Any other failure; wrapped in a 500 envelope carrying its message.
    #[error(transparent)]
    Bare(anyhow::Error),
}

impl ApiError {
    /// Wraps an arbitrary error as a bare failure.
    pub fn bare<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Bare(anyhow::Error::new(err))
    }

    /// Resolves into the envelope written to the client.
    #[must_use]
    pub fn into_envelope(self) -> HttpError {
        match self {
            Self::Envelope(envelope) => envelope,
            Self::Bare(err) => HttpError::new(err.to_string()),
        }
    }
}

impl From<HttpError> for ApiError {
    fn from(err: HttpError) -> Self {
        Self::Envelope(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Bare(err)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Envelope(HttpError::validation(&errors))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::bare(err)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::bare(err)
    }
}
