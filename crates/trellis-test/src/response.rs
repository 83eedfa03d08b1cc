//! Test response wrapper.

use std::fmt;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use trellis_core::HttpError;

use crate::TestError;

/// A buffered response with assertion helpers.
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    /// Buffers an HTTP response.
    pub async fn from_http<B>(response: http::Response<B>) -> Result<Self, TestError>
    where
        B: BodyExt,
        B::Error: fmt::Display,
    {
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TestError::BodyRead(e.to_string()))?
            .to_bytes();
        Ok(Self::new(parts.status, parts.headers, body))
    }

    /// Creates a response from raw parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self { status, headers, body }
    }

    /// Status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Status code as a number.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value.
    #[must_use]
    pub fn header(&self, name: impl AsRef<str>) -> Option<&HeaderValue> {
        self.headers.get(name.as_ref())
    }

    /// A header value as text.
    #[must_use]
    pub fn header_str(&self, name: impl AsRef<str>) -> Option<&str> {
        self.header(name).and_then(|v| v.to_str().ok())
    }

    /// The `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header_str(header::CONTENT_TYPE.as_str())
    }

    /// The raw body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> Result<String, TestError> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| TestError::BodyRead(format!("invalid UTF-8: {e}")))
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decodes the body as a JSON value.
    pub fn json_value(&self) -> Result<Value, TestError> {
        self.json()
    }

    /// Decodes the body as an error envelope.
    pub fn envelope(&self) -> Result<HttpError, TestError> {
        self.json()
    }

    /// The `data` member of a success body.
    pub fn data(&self) -> Result<Value, TestError> {
        let mut value = self.json_value()?;
        Ok(value.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }

    /// Asserts the status code.
    ///
    /// # Panics
    ///
    /// Panics on mismatch.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "expected status {expected}, got {} with body {}",
            self.status,
            String::from_utf8_lossy(&self.body)
        );
        self
    }

    /// Asserts a header value.
    ///
    /// # Panics
    ///
    /// Panics when the header is missing or differs.
    pub fn assert_header(&self, name: impl AsRef<str>, expected: impl AsRef<str>) -> &Self {
        let name = name.as_ref();
        let actual = self
            .header_str(name)
            .unwrap_or_else(|| panic!("header '{name}' not found"));
        assert_eq!(actual, expected.as_ref(), "header '{name}'");
        self
    }

    /// Asserts the body text.
    ///
    /// # Panics
    ///
    /// Panics on mismatch.
    pub fn assert_body_eq(&self, expected: impl AsRef<str>) -> &Self {
        assert_eq!(String::from_utf8_lossy(&self.body), expected.as_ref());
        self
    }

    /// Asserts the `code` of an error envelope.
    ///
    /// # Panics
    ///
    /// Panics when the body is not an envelope or the code differs.
    pub fn assert_error_code(&self, expected: impl AsRef<str>) -> &Self {
        let envelope = self
            .envelope()
            .unwrap_or_else(|e| panic!("body is not an error envelope: {e}"));
        assert_eq!(envelope.code, expected.as_ref(), "error code");
        self
    }

    /// Asserts a value at a `/`-separated JSON pointer.
    ///
    /// # Panics
    ///
    /// Panics when the pointer is missing or the value differs.
    pub fn assert_json_field(&self, pointer: impl AsRef<str>, expected: &Value) -> &Self {
        let pointer = pointer.as_ref();
        let json = self.json_value().unwrap_or_else(|e| panic!("body is not JSON: {e}"));
        let actual = json
            .pointer(pointer)
            .unwrap_or_else(|| panic!("JSON pointer '{pointer}' not found in {json}"));
        assert_eq!(actual, expected, "JSON field '{pointer}'");
        self
    }
}

impl fmt::Debug for TestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &String::from_utf8_lossy(&self.body))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: &'static str) -> TestResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        TestResponse::new(
            StatusCode::from_u16(status).unwrap(),
            headers,
            Bytes::from_static(body.as_bytes()),
        )
    }

    #[test]
    fn test_envelope() {
        let r = response(400, r#"{"message":"bad","code":"BAD","status":400,"trace_id":"t"}"#);
        let envelope = r.envelope().unwrap();
        assert_eq!(envelope.code, "BAD");
        r.assert_status(StatusCode::BAD_REQUEST).assert_error_code("BAD");
    }

    #[test]
    fn test_data_and_pointer() {
        let r = response(200, r#"{"message":"ok","data":{"items":[1,2]},"error":null}"#);
        assert_eq!(r.data().unwrap(), json!({"items": [1, 2]}));
        r.assert_json_field("/data/items/1", &json!(2));
        r.assert_header("content-type", "application/json");
    }

    #[test]
    #[should_panic(expected = "expected status 200")]
    fn test_assert_status_panics() {
        response(500, "{}").assert_status(StatusCode::OK);
    }
}
