//! Request ID middleware.
//!
//! Honours an incoming `X-Request-ID` header; otherwise generates a
//! 15-character alphanumeric id. The id is stored on the context and in the
//! request extensions, and echoed on the response.

use http::HeaderValue;
use trellis_core::{RequestContext, RequestId};

use crate::{BoxFuture, HttpRequest, Middleware, Next, Response};

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest incoming id that is accepted as-is.
const MAX_INCOMING_LEN: usize = 128;

/// Middleware that assigns every request an id.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdMiddleware;

impl RequestIdMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn extract(request: &HttpRequest) -> Option<RequestId> {
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_INCOMING_LEN)
            .map(RequestId::from_string)
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        mut request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let request_id = Self::extract(&request).unwrap_or_else(RequestId::generate);
            ctx.set_request_id(request_id.clone());
            ctx.span().record("request_id", request_id.as_str());
            request.extensions_mut().insert(request_id.clone());

            let mut response = next.run(ctx, request).await;

            if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Endpoint;
    use crate::writer::text_response;
    use bytes::Bytes;
    use http::StatusCode;
    use trellis_core::REQUEST_ID_LEN;

    struct EchoExtension;

    impl Endpoint for EchoExtension {
        fn call<'a>(
            &'a self,
            _ctx: &'a mut RequestContext,
            request: HttpRequest,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                let seen = request.extensions().get::<RequestId>().is_some();
                let status = if seen {
                    StatusCode::OK
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                text_response(status, "ok")
            })
        }
    }

    async fn run(request: HttpRequest) -> (RequestContext, Response) {
        let chain: Vec<std::sync::Arc<dyn Middleware>> =
            vec![std::sync::Arc::new(RequestIdMiddleware::new())];
        let mut ctx = RequestContext::new();
        let response = Next::new(&chain, &EchoExtension).run(&mut ctx, request).await;
        (ctx, response)
    }

    #[tokio::test]
    async fn test_generates_request_id_when_missing() {
        let request = http::Request::builder().uri("/").body(Bytes::new()).unwrap();
        let (ctx, response) = run(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        let header = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert_eq!(header.len(), REQUEST_ID_LEN);
        assert!(header.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(ctx.request_id().map(RequestId::as_str), Some(header));
    }

    #[tokio::test]
    async fn test_uses_incoming_id() {
        let request = http::Request::builder()
            .uri("/")
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(Bytes::new())
            .unwrap();
        let (ctx, response) = run(request).await;

        assert_eq!(response.headers()[REQUEST_ID_HEADER], "abc-123");
        assert_eq!(ctx.request_id().map(RequestId::as_str), Some("abc-123"));
    }

    #[tokio::test]
    async fn test_blank_incoming_id_is_replaced() {
        let request = http::Request::builder()
            .uri("/")
            .header(REQUEST_ID_HEADER, "   ")
            .body(Bytes::new())
            .unwrap();
        let (_ctx, response) = run(request).await;
        assert_eq!(response.headers()[REQUEST_ID_HEADER].len(), REQUEST_ID_LEN);
    }

    #[test]
    fn test_middleware_name() {
        assert_eq!(RequestIdMiddleware::new().name(), "request_id");
    }
}
