//! Adds `X-XSS-Protection` and `X-Content-Type-Options` to every response.

use http::header::{HeaderValue, X_CONTENT_TYPE_OPTIONS, X_XSS_PROTECTION};
use trellis_core::RequestContext;

use crate::{BoxFuture, HttpRequest, Middleware, Next, Response};

/// Secure-headers middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureHeadersMiddleware;

impl SecureHeadersMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for SecureHeadersMiddleware {
    fn name(&self) -> &'static str {
        "secure_headers"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let mut response = next.run(ctx, request).await;
            let headers = response.headers_mut();
            headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
            headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
            response
        })
    }
}
