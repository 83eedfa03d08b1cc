//! Type-erased handlers.
//!
//! Handlers are async functions taking the request view and the deadline
//! context and returning a [`HandlerResult`]:
//!
//! ```
//! use trellis_core::{ApiResponse, HandlerResult, RequestContext};
//! use trellis_extract::Request;
//! use trellis_server::IntoHandler;
//!
//! async fn hello(req: Request, _ctx: RequestContext) -> HandlerResult {
//!     Ok(ApiResponse::ok(format!("hello {}", req.param_or("name", "world"))))
//! }
//!
//! let handler = hello.into_handler();
//! # let _ = handler;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use trellis_core::{HandlerResult, RequestContext};
use trellis_extract::Request;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A handler after type erasure.
pub type BoxedHandler =
    Arc<dyn Fn(Request, RequestContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Conversion into a [`BoxedHandler`].
pub trait IntoHandler {
    /// Erases the handler type.
    fn into_handler(self) -> BoxedHandler;
}

impl<F, Fut> IntoHandler for F
where
    F: Fn(Request, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn into_handler(self) -> BoxedHandler {
        Arc::new(move |req, ctx| Box::pin(self(req, ctx)))
    }
}
