//! Test request building.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use serde::Serialize;
use trellis_extract::RemoteAddr;

use crate::TestError;

const BOUNDARY: &str = "trellis-test-boundary";

/// Builder for a request sent through a [`TestClient`](crate::TestClient).
#[derive(Debug)]
#[must_use]
pub struct TestRequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    parts: Vec<Part>,
    remote_addr: Option<SocketAddr>,
    error: Option<TestError>,
}

#[derive(Debug)]
enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: String,
        data: Bytes,
    },
}

impl TestRequestBuilder {
    /// Creates a builder.
    pub fn new(method: Method, uri: impl AsRef<str>) -> Self {
        Self {
            method,
            uri: uri.as_ref().to_string(),
            headers: HeaderMap::new(),
            body: None,
            parts: Vec::new(),
            remote_addr: None,
            error: None,
        }
    }

    fn fail(&mut self, error: TestError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Sets a header, replacing any previous value.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = match HeaderName::try_from(name.as_ref()) {
            Ok(name) => name,
            Err(e) => {
                self.fail(TestError::InvalidHeader(format!("{}: {e}", name.as_ref())));
                return self;
            }
        };
        match HeaderValue::try_from(value.as_ref()) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(e) => self.fail(TestError::InvalidHeader(format!("{name}: {e}"))),
        }
        self
    }

    /// Sets the `Content-Type` header.
    pub fn content_type(self, content_type: impl AsRef<str>) -> Self {
        self.header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Sets a bearer `Authorization` header.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header(header::AUTHORIZATION.as_str(), format!("Bearer {}", token.as_ref()))
    }

    /// Sets the peer address seen by handlers.
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a JSON body and content type.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.body = Some(Bytes::from(bytes)),
            Err(e) => self.fail(TestError::Json(e)),
        }
        self.content_type("application/json")
    }

    /// Sets a form-urlencoded body and content type.
    pub fn form<T: Serialize>(mut self, value: &T) -> Self {
        match serde_urlencoded::to_string(value) {
            Ok(encoded) => self.body = Some(Bytes::from(encoded)),
            Err(e) => self.fail(TestError::RequestBuild(format!("form encoding failed: {e}"))),
        }
        self.content_type("application/x-www-form-urlencoded")
    }

    /// Adds a text part to a multipart body.
    pub fn text_part(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a file part to a multipart body.
    pub fn file_part(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(Part::File {
            name: name.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        });
        self
    }

    /// Builds the HTTP request.
    pub fn build(mut self) -> Result<http::Request<Bytes>, TestError> {
        if !self.parts.is_empty() {
            let body = multipart_body(&self.parts);
            self = self.content_type(format!("multipart/form-data; boundary={BOUNDARY}"));
            self.body = Some(body);
        }
        if let Some(error) = self.error {
            return Err(error);
        }

        let uri: Uri = self
            .uri
            .parse()
            .map_err(|e| TestError::RequestBuild(format!("invalid URI {}: {e}", self.uri)))?;

        let mut request = http::Request::new(self.body.unwrap_or_default());
        *request.method_mut() = self.method;
        *request.uri_mut() = uri;
        *request.headers_mut() = self.headers;
        if let Some(addr) = self.remote_addr {
            request.extensions_mut().insert(RemoteAddr(addr));
        }
        Ok(request)
    }
}

fn multipart_body(parts: &[Part]) -> Bytes {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text { name, value } => {
                let disposition =
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n");
                body.extend_from_slice(disposition.as_bytes());
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Bytes::from(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_request() {
        let request = TestRequestBuilder::new(Method::POST, "/v1/users")
            .json(&json!({"name": "ada"}))
            .build()
            .unwrap();
        assert_eq!(request.headers()["content-type"], "application/json");
        assert_eq!(&request.body()[..], br#"{"name":"ada"}"#);
    }

    #[test]
    fn test_invalid_header_surfaces_on_build() {
        let err = TestRequestBuilder::new(Method::GET, "/")
            .header("bad header", "x")
            .build()
            .unwrap_err();
        assert!(matches!(err, TestError::InvalidHeader(_)));
    }

    #[test]
    fn test_invalid_uri() {
        let err = TestRequestBuilder::new(Method::GET, "http://[::1").build().unwrap_err();
        assert!(matches!(err, TestError::RequestBuild(_)));
    }

    #[test]
    fn test_multipart_body() {
        let request = TestRequestBuilder::new(Method::POST, "/v1/import")
            .text_part("sheet", "People")
            .file_part("file", "people.csv", "text/csv", "name\nA\n")
            .build()
            .unwrap();
        let content_type = request.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        let body = std::str::from_utf8(request.body()).unwrap();
        assert!(body.contains("filename=\"people.csv\""));
        assert!(body.ends_with("--trellis-test-boundary--\r\n"));
    }

    #[test]
    fn test_remote_addr_extension() {
        let addr: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        let request = TestRequestBuilder::new(Method::GET, "/").remote_addr(addr).build().unwrap();
        assert_eq!(request.extensions().get::<RemoteAddr>().map(|r| r.0), Some(addr));
    }
}
