//! Response construction and the single-write guard.
//!
//! [`ResponseWriter`] accepts exactly one write. Every path through the
//! execution pipeline ends in a single call on it, so a late handler result
//! racing a timeout can never produce a second response.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;
use trellis_core::{codes, ApiResponse, HttpError};

use crate::WriteError;

/// Body type of every response the server emits.
pub type ResponseBody = Full<Bytes>;

/// The HTTP response type.
pub type Response = http::Response<ResponseBody>;

/// Content type for JSON bodies.
pub const APPLICATION_JSON: &str = "application/json";

/// Content type for the timeout body.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

const ENCODE_FAILURE_BODY: &str =
    r#"{"message":"failed to encode response","code":"SERVER_ERROR","status":500,"trace_id":""}"#;

/// Success body: `{"message": .., "data": .., "error": null}`.
#[derive(Debug, Serialize)]
pub struct SuccessBody<'a> {
    /// Human-readable message.
    pub message: &'a str,
    /// Payload.
    pub data: &'a Value,
    /// Always `null` on success.
    pub error: Option<&'a HttpError>,
}

impl<'a> From<&'a ApiResponse> for SuccessBody<'a> {
    fn from(response: &'a ApiResponse) -> Self {
        Self {
            message: &response.message,
            data: &response.data,
            error: None,
        }
    }
}

/// Builds a response with the given status, content type, and body.
pub fn raw_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response {
    let mut response = http::Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Serialises `value` as JSON.
///
/// Encoding failures are logged and replaced by a minimal 500 envelope.
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => raw_response(status, APPLICATION_JSON, body),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode response body");
            raw_response(StatusCode::INTERNAL_SERVER_ERROR, APPLICATION_JSON, ENCODE_FAILURE_BODY)
        }
    }
}

/// Emits an error envelope with its own status.
pub fn error_response(error: &HttpError) -> Response {
    json_response(error.status_code(), error)
}

/// Emits `{message, data, error: null}` with 200.
pub fn success_response(response: &ApiResponse) -> Response {
    json_response(StatusCode::OK, &SuccessBody::from(response))
}

/// Emits a plain-text body.
pub fn text_response(status: StatusCode, body: &'static str) -> Response {
    raw_response(status, TEXT_PLAIN, body)
}

/// The fallback when a writer is finished without anything written.
fn unwritten_response() -> Response {
    error_response(&HttpError::internal("no response written", codes::SERVER_ERROR))
}

/// A single-shot response slot.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use trellis_core::ApiResponse;
/// use trellis_server::{ResponseWriter, WriteError};
///
/// let mut writer = ResponseWriter::new();
/// writer.write_success(&ApiResponse::ok("done")).unwrap();
/// assert_eq!(
///     writer.write_text(StatusCode::GATEWAY_TIMEOUT, "timeout"),
///     Err(WriteError::AlreadyWritten)
/// );
/// assert_eq!(writer.finish().status(), StatusCode::OK);
/// ```
#[derive(Debug, Default)]
pub struct ResponseWriter {
    response: Option<Response>,
}

impl ResponseWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once a response has been written.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.response.is_some()
    }

    /// Status of the written response, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(http::Response::status)
    }

    /// Stores a fully built response.
    pub fn write(&mut self, response: Response) -> Result<(), WriteError> {
        if self.response.is_some() {
            return Err(WriteError::AlreadyWritten);
        }
        self.response = Some(response);
        Ok(())
    }

    /// Writes `value` as JSON.
    pub fn write_json<T: Serialize + ?Sized>(
        &mut self,
        status: StatusCode,
        value: &T,
    ) -> Result<(), WriteError> {
        self.guard()?;
        self.write(json_response(status, value))
    }

    /// Writes an error envelope.
    pub fn write_error(&mut self, error: &HttpError) -> Result<(), WriteError> {
        self.guard()?;
        self.write(error_response(error))
    }

    /// Writes a success body.
    pub fn write_success(&mut self, response: &ApiResponse) -> Result<(), WriteError> {
        self.guard()?;
        self.write(success_response(response))
    }

    /// Writes a plain-text body.
    pub fn write_text(&mut self, status: StatusCode, body: &'static str) -> Result<(), WriteError> {
        self.guard()?;
        self.write(text_response(status, body))
    }

    /// Takes the written response, or a 500 envelope when nothing was written.
    pub fn finish(self) -> Response {
        self.response.unwrap_or_else(|| {
            tracing::warn!("response writer finished without a write");
            unwritten_response()
        })
    }

    fn guard(&self) -> Result<(), WriteError> {
        if self.is_written() {
            Err(WriteError::AlreadyWritten)
        } else {
            Ok(())
        }
    }
}
