//! In-memory client over an assembled [`App`].

use http::Method;
use trellis_server::App;

use crate::{TestError, TestRequestBuilder, TestResponse};

/// Sends requests straight into an [`App`] without binding a port.
///
/// Requests run through the full middleware chain, route table, and
/// execution pipeline, exactly as the listener would drive them.
///
/// ```rust,ignore
/// let client = TestClient::new(app);
/// let response = client.get("/v1/users/1").send().await;
/// response.assert_status(StatusCode::OK);
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct TestClient {
    app: App,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Wraps `app`.
    pub fn new(app: App) -> Self {
        Self {
            app,
            default_headers: Vec::new(),
        }
    }

    /// Adds a header sent with every request.
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// The wrapped app.
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// Starts a PATCH request.
    pub fn patch(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PATCH, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        let mut builder = TestRequestBuilder::new(method, uri);
        for (name, value) in &self.default_headers {
            builder = builder.header(name, value);
        }
        TestClientRequest { client: self, builder }
    }
}

/// A request bound to a [`TestClient`].
#[derive(Debug)]
#[must_use]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl TestClientRequest<'_> {
    /// Applies a change to the underlying builder.
    pub fn with(mut self, f: impl FnOnce(TestRequestBuilder) -> TestRequestBuilder) -> Self {
        self.builder = f(self.builder);
        self
    }

    /// Sets a header.
    pub fn header(self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.with(|b| b.header(name, value))
    }

    /// Sets a bearer token.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.with(|b| b.bearer_token(token))
    }

    /// Sets the raw body.
    pub fn body(self, body: impl Into<bytes::Bytes>) -> Self {
        self.with(|b| b.body(body))
    }

    /// Sets a JSON body.
    pub fn json<T: serde::Serialize>(self, value: &T) -> Self {
        self.with(|b| b.json(value))
    }

    /// Sets a form body.
    pub fn form<T: serde::Serialize>(self, value: &T) -> Self {
        self.with(|b| b.form(value))
    }

    /// Adds a multipart file part.
    pub fn file_part(
        self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<bytes::Bytes>,
    ) -> Self {
        self.with(|b| b.file_part(name, file_name, content_type, data))
    }

    /// Adds a multipart text part.
    pub fn text_part(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(|b| b.text_part(name, value))
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics when the request cannot be built or the body cannot be read.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("test request failed: {e}"),
        }
    }

    /// Sends the request, returning build and read failures.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        let response = self.client.app.handle(request).await;
        TestResponse::from_http(response).await
    }
}
