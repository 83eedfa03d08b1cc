//! Decoding errors.

use thiserror::Error;
use trellis_core::{codes, ApiError, HttpError, ValidationErrors};

/// Why a request accessor failed.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The query string does not match the target type.
    #[error("invalid query parameters: {0}")]
    Query(String),

    /// The headers do not match the target type.
    #[error("invalid headers: {0}")]
    Header(String),

    /// The body does not match the target type.
    #[error("invalid request body: {0}")]
    Body(String),

    /// The body's content type is missing or unsupported.
    #[error("unsupported content type: {0}")]
    ContentType(String),

    /// The multipart payload exceeds the configured limit.
    #[error("payload too large: limit {limit} bytes, got {actual} bytes")]
    PayloadTooLarge {
        /// Configured limit.
        limit: usize,
        /// Received size.
        actual: usize,
    },

    /// The multipart payload is malformed.
    #[error("invalid multipart payload: {0}")]
    Multipart(String),

    /// No file part with the requested name.
    #[error("file `{0}` not found in request")]
    FileNotFound(String),

    /// The decoded value failed validation.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
}

impl DecodeError {
    /// Converts into the error envelope sent to the client.
    #[must_use]
    pub fn into_http_error(self) -> HttpError {
        let message = self.to_string();
        match self {
            Self::Query(_) => HttpError::bad_request(message, codes::ERROR_PARSING_QUERY_PARAMS),
            Self::Header(_) => HttpError::bad_request(message, codes::ERROR_PARSING_HEADER),
            Self::Body(_) | Self::Multipart(_) | Self::PayloadTooLarge { .. } => {
                HttpError::bad_request(message, codes::ERROR_PARSING_BODY)
            }
            Self::ContentType(_) => {
                HttpError::bad_request(message, codes::ERR_INVALID_CONTENT_TYPE)
            }
            Self::FileNotFound(_) => HttpError::bad_request(message, codes::ERROR_RETRIEVE_FILE),
            Self::Validation(errors) => HttpError::validation(&errors),
        }
    }
}

impl From<DecodeError> for HttpError {
    fn from(err: DecodeError) -> Self {
        err.into_http_error()
    }
}

impl From<DecodeError> for ApiError {
    fn from(err: DecodeError) -> Self {
        Self::Envelope(err.into_http_error())
    }
}

impl From<ValidationErrors> for DecodeError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_codes() {
        let cases = [
            (DecodeError::Query("x".into()), 400, codes::ERROR_PARSING_QUERY_PARAMS),
            (DecodeError::Header("x".into()), 400, codes::ERROR_PARSING_HEADER),
            (DecodeError::Body("x".into()), 400, codes::ERROR_PARSING_BODY),
            (DecodeError::ContentType("x".into()), 400, codes::ERR_INVALID_CONTENT_TYPE),
            (DecodeError::FileNotFound("f".into()), 400, codes::ERROR_RETRIEVE_FILE),
            (DecodeError::Validation(ValidationErrors::new()), 422, codes::VALIDATION_ERROR),
        ];
        for (err, status, code) in cases {
            let envelope = err.into_http_error();
            assert_eq!(envelope.status, status);
            assert_eq!(envelope.code, code);
        }
    }

    #[test]
    fn test_too_large_message() {
        let err = DecodeError::PayloadTooLarge { limit: 10, actual: 20 };
        assert!(err.to_string().contains("limit 10"));
    }
}
