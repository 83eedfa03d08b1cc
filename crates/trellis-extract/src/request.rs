//! The per-request view handed to handlers.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{header, HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use trellis_core::{Validate, ValidationMode};

use crate::{DecodeError, MultipartConfig, MultipartForm, PathParams, UploadedFile};

/// Peer address of the connection, stored in request extensions by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Handler-facing request view.
///
/// The body is fully buffered before the handler runs, so accessors can be
/// called in any order and more than once.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use trellis_extract::{PathParams, Request};
///
/// let http = http::Request::builder()
///     .uri("/v1/users/42?verbose=true")
///     .body(Bytes::new())
///     .unwrap();
/// let params: PathParams = [("id", "42")].into_iter().collect();
/// let req = Request::from_http(http, params);
///
/// assert_eq!(req.param("id"), "42");
/// assert_eq!(req.param_or("tenant", "default"), "default");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: PathParams,
    remote_addr: Option<SocketAddr>,
    multipart: MultipartConfig,
}

impl Request {
    /// Builds the view from a buffered HTTP request and matched parameters.
    #[must_use]
    pub fn from_http(request: http::Request<Bytes>, params: PathParams) -> Self {
        let (parts, body) = request.into_parts();
        let remote_addr = parts.extensions.get::<RemoteAddr>().map(|r| r.0);
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params,
            remote_addr,
            multipart: MultipartConfig::default(),
        }
    }

    /// Overrides the multipart limits.
    #[must_use]
    pub fn with_multipart_config(mut self, config: MultipartConfig) -> Self {
        self.multipart = config;
        self
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// `Host` header, falling back to the URI authority.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.header(header::HOST.as_str()).or_else(|| self.uri.host())
    }

    /// Peer address, when served from a socket.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Raw header map.
    #[must_use]
    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    /// A single header value, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Raw buffered body.
    #[must_use]
    pub fn raw_body(&self) -> &Bytes {
        &self.body
    }

    /// Matched path parameters.
    #[must_use]
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Path parameter `key`, or empty when absent.
    #[must_use]
    pub fn param(&self, key: &str) -> &str {
        self.params.get(key).unwrap_or_default()
    }

    /// Path parameter `key`, or `default` when absent.
    #[must_use]
    pub fn param_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.params.get(key).unwrap_or(default)
    }

    /// Validation mode implied by the method: `PATCH` validates as an update.
    #[must_use]
    pub fn validation_mode(&self) -> ValidationMode {
        if self.method == Method::PATCH {
            ValidationMode::Update
        } else {
            ValidationMode::Create
        }
    }

    /// Decodes and validates the query string.
    pub fn query<T>(&self) -> Result<T, DecodeError>
    where
        T: DeserializeOwned + Validate,
    {
        let value: T = self.decode_query()?;
        value.validate_in(self.validation_mode())?;
        Ok(value)
    }

    /// Decodes and validates the headers.
    ///
    /// Header names are lowercase; map them with `#[serde(rename = "x-api-key")]`.
    /// Only the first value of a repeated header is used.
    pub fn headers<T>(&self) -> Result<T, DecodeError>
    where
        T: DeserializeOwned + Validate,
    {
        let pairs: Vec<(&str, &str)> = self
            .headers
            .keys()
            .filter_map(|name| {
                let value = self.headers.get(name)?.to_str().ok()?;
                Some((name.as_str(), value))
            })
            .collect();
        let encoded =
            serde_urlencoded::to_string(&pairs).map_err(|e| DecodeError::Header(e.to_string()))?;
        let value: T =
            serde_urlencoded::from_str(&encoded).map_err(|e| DecodeError::Header(e.to_string()))?;
        value.validate_in(self.validation_mode())?;
        Ok(value)
    }

    /// Decodes and validates the body according to `Content-Type`.
    ///
    /// - `GET` always decodes the query string.
    /// - `DELETE` with an empty body decodes the query string.
    /// - `application/json`, `application/x-www-form-urlencoded`, and
    ///   `multipart/form-data` decode the body; multipart text parts map to fields.
    /// - `text/plain` decodes nothing: the target is built from an empty form
    ///   and returned without validation.
    pub async fn body<T>(&self) -> Result<T, DecodeError>
    where
        T: DeserializeOwned + Validate,
    {
        if self.method == Method::GET || (self.method == Method::DELETE && self.body.is_empty()) {
            return self.query();
        }

        let content_type = self
            .header(header::CONTENT_TYPE.as_str())
            .ok_or_else(|| DecodeError::ContentType("missing Content-Type header".into()))?;
        let mime: mime::Mime = content_type
            .parse()
            .map_err(|_| DecodeError::ContentType(content_type.to_string()))?;

        let value: T = match mime.essence_str() {
            "application/json" => serde_json::from_slice(&self.body)
                .map_err(|e| DecodeError::Body(e.to_string()))?,
            "application/x-www-form-urlencoded" => serde_urlencoded::from_bytes(&self.body)
                .map_err(|e| DecodeError::Body(e.to_string()))?,
            "multipart/form-data" => {
                let form = self.multipart().await?;
                let encoded = serde_urlencoded::to_string(&form.fields)
                    .map_err(|e| DecodeError::Body(e.to_string()))?;
                serde_urlencoded::from_str(&encoded).map_err(|e| DecodeError::Body(e.to_string()))?
            }
            "text/plain" => {
                return serde_urlencoded::from_str("").map_err(|e| DecodeError::Body(e.to_string()));
            }
            other => return Err(DecodeError::ContentType(other.to_string())),
        };

        value.validate_in(self.validation_mode())?;
        Ok(value)
    }

    /// Parses the multipart body.
    pub async fn multipart(&self) -> Result<MultipartForm, DecodeError> {
        MultipartForm::parse(&self.headers, self.body.clone(), &self.multipart).await
    }

    /// Returns the multipart file part named `key`.
    pub async fn file(&self, key: &str) -> Result<UploadedFile, DecodeError> {
        self.multipart()
            .await?
            .take_file(key)
            .ok_or_else(|| DecodeError::FileNotFound(key.to_string()))
    }

    fn decode_query<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        serde_urlencoded::from_str(self.uri.query().unwrap_or_default())
            .map_err(|e| DecodeError::Query(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::tests::{multipart_body, BOUNDARY};
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use trellis_core::validate::{rules, FieldError, ValidationErrors};
    use trellis_core::Nullable;

    #[derive(Debug, Deserialize, Serialize)]
    struct Search {
        q: String,
        page: Option<u32>,
    }

    impl Validate for Search {
        const NAME: &'static str = "Search";

        fn validate_fields(&self, path: &str, _: ValidationMode, errors: &mut ValidationErrors) {
            if !rules::required(&self.q) {
                errors.push(FieldError::new(
                    rules::join(path, "q"),
                    "required",
                    rules::field_value(&self.q),
                ));
            }
        }
    }

    #[derive(Debug, Deserialize, Serialize)]
    struct Rename {
        #[serde(default)]
        name: Nullable<String>,
    }

    impl Validate for Rename {
        const NAME: &'static str = "Rename";

        fn validate_fields(&self, path: &str, mode: ValidationMode, errors: &mut ValidationErrors) {
            if mode.is_update() && rules::is_null(&self.name) {
                return;
            }
            if !rules::required(&self.name) {
                errors.push(FieldError::new(
                    rules::join(path, "name"),
                    "required",
                    rules::field_value(&self.name),
                ));
            }
        }
    }

    fn request(
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: impl Into<Bytes>,
    ) -> Request {
        let mut builder = http::Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        Request::from_http(builder.body(body.into()).unwrap(), PathParams::new())
    }

    #[test]
    fn test_query_decodes_and_validates() {
        let req = request(Method::GET, "/s?q=rust&page=2", None, Bytes::new());
        let search: Search = req.query().unwrap();
        assert_eq!(search.q, "rust");
        assert_eq!(search.page, Some(2));

        let req = request(Method::GET, "/s?q=", None, Bytes::new());
        assert!(matches!(req.query::<Search>(), Err(DecodeError::Validation(_))));

        let req = request(Method::GET, "/s?q=x&page=abc", None, Bytes::new());
        assert!(matches!(req.query::<Search>(), Err(DecodeError::Query(_))));
    }

    #[test]
    fn test_headers_decode() {
        #[derive(Debug, Deserialize)]
        struct Auth {
            #[serde(rename = "x-api-key")]
            api_key: String,
        }
        impl Validate for Auth {
            const NAME: &'static str = "Auth";
            fn validate_fields(&self, _: &str, _: ValidationMode, _: &mut ValidationErrors) {}
        }

        let http = http::Request::builder()
            .uri("/")
            .header("X-Api-Key", "secret")
            .header("Accept", "application/json")
            .body(Bytes::new())
            .unwrap();
        let req = Request::from_http(http, PathParams::new());
        let auth: Auth = req.headers().unwrap();
        assert_eq!(auth.api_key, "secret");

        let req = request(Method::GET, "/", None, Bytes::new());
        let err = req.headers::<Auth>().unwrap_err();
        assert!(matches!(err, DecodeError::Header(_)));
    }

    #[test]
    fn test_headers_into_map() {
        let req = request(Method::GET, "/", Some("text/plain"), Bytes::new());
        let map: HashMap<String, String> = req.headers().unwrap();
        assert_eq!(map.get("content-type").map(String::as_str), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_body_json() {
        let req = request(Method::POST, "/", Some("application/json"), r#"{"q":"a"}"#);
        let search: Search = req.body().await.unwrap();
        assert_eq!(search.q, "a");

        let req = request(Method::POST, "/", Some("application/json; charset=utf-8"), "{");
        assert!(matches!(req.body::<Search>().await, Err(DecodeError::Body(_))));
    }

    #[tokio::test]
    async fn test_body_form() {
        let req = request(
            Method::POST,
            "/",
            Some("application/x-www-form-urlencoded"),
            "q=hello+world&page=3",
        );
        let search: Search = req.body().await.unwrap();
        assert_eq!(search.q, "hello world");
        assert_eq!(search.page, Some(3));
    }

    #[tokio::test]
    async fn test_body_multipart_fields_and_file() {
        let body = multipart_body(&[("q", "from-form")], &[("upload", "data.csv", "x,y")]);
        let ct = format!("multipart/form-data; boundary={BOUNDARY}");
        let req = request(Method::POST, "/", Some(&ct), body);

        let search: Search = req.body().await.unwrap();
        assert_eq!(search.q, "from-form");

        let file = req.file("upload").await.unwrap();
        assert_eq!(file.size(), 3);
        assert!(matches!(req.file("other").await, Err(DecodeError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_get_uses_query_string() {
        let req = request(
            Method::GET,
            "/?q=from-query",
            Some("application/json"),
            r#"{"q":"body"}"#,
        );
        let search: Search = req.body().await.unwrap();
        assert_eq!(search.q, "from-query");
    }

    #[tokio::test]
    async fn test_delete_without_body() {
        let req = request(Method::DELETE, "/?q=gone", None, Bytes::new());
        let search: Search = req.body().await.unwrap();
        assert_eq!(search.q, "gone");
    }

    #[tokio::test]
    async fn test_content_type_errors() {
        let req = request(Method::POST, "/", None, "{}");
        assert!(matches!(req.body::<Search>().await, Err(DecodeError::ContentType(_))));

        let req = request(Method::POST, "/", Some("application/xml"), "<a/>");
        let err = req.body::<Search>().await.unwrap_err();
        assert_eq!(err.into_http_error().code, "ERR_INVALID_CONTENT_TYPE");
    }

    #[tokio::test]
    async fn test_text_plain_is_a_no_op() {
        let req = request(Method::POST, "/", Some("text/plain"), "ignored");
        let value: HashMap<String, String> = req.body().await.unwrap();
        assert!(value.is_empty());
    }

    #[tokio::test]
    async fn test_patch_validates_as_update() {
        let req = request(Method::PATCH, "/", Some("application/json"), "{}");
        let rename: Rename = req.body().await.unwrap();
        assert!(!rename.name.is_valid());

        let req = request(Method::PUT, "/", Some("application/json"), "{}");
        let err = req.body::<Rename>().await.unwrap_err();
        let envelope = err.into_http_error();
        assert_eq!(envelope.status, 422);
        assert_eq!(envelope.data.unwrap()[0]["field"], "Rename.name");
    }

    #[test]
    fn test_metadata_accessors() {
        let mut http = http::Request::builder()
            .uri("/v1/items")
            .header(header::HOST, "api.local")
            .body(Bytes::new())
            .unwrap();
        let addr: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        http.extensions_mut().insert(RemoteAddr(addr));
        let req = Request::from_http(http, PathParams::new());

        assert_eq!(req.host(), Some("api.local"));
        assert_eq!(req.remote_addr(), Some(addr));
        assert_eq!(req.path(), "/v1/items");
        assert_eq!(req.param("missing"), "");
    }
}
