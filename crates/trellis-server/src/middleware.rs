//! Middleware trait and chain driver.
//!
//! A chain is an ordered slice of middleware ending in an [`Endpoint`].
//! Each middleware receives a [`Next`] and either calls it once or
//! short-circuits with its own response.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use trellis_core::{HttpError, RequestContext};
//! use trellis_server::{error_response, BoxFuture, HttpRequest, Middleware, Next, Response};
//!
//! struct RequireToken;
//!
//! impl Middleware for RequireToken {
//!     fn name(&self) -> &'static str {
//!         "require_token"
//!     }
//!
//!     fn handle<'a>(
//!         &'a self,
//!         ctx: &'a mut RequestContext,
//!         request: HttpRequest,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             if request.headers().contains_key("authorization") {
//!                 next.run(ctx, request).await
//!             } else {
//!                 error_response(&HttpError::unauthorized("missing token", "UNAUTHORIZED"))
//!             }
//!         })
//!     }
//! }
//! ```

use std::sync::Arc;

use bytes::Bytes;
use trellis_core::RequestContext;

use crate::{BoxFuture, Response};

/// Buffered inbound request as seen by middleware.
pub type HttpRequest = http::Request<Bytes>;

/// A request processing stage.
///
/// Middleware must call `next.run()` at most once. Returning without
/// calling it aborts the chain with the middleware's own response.
pub trait Middleware: Send + Sync + 'static {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request.
    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// The end of a middleware chain.
pub trait Endpoint: Send + Sync {
    /// Produces the response.
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: HttpRequest,
    ) -> BoxFuture<'a, Response>;
}

/// The remainder of a chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    /// Starts a chain over `chain` that ends in `endpoint`.
    pub fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self { chain, endpoint }
    }

    /// Runs the next middleware, or the endpoint when the chain is exhausted.
    pub async fn run(self, ctx: &mut RequestContext, request: HttpRequest) -> Response {
        match self.chain.split_first() {
            Some((middleware, rest)) => {
                let next = Next {
                    chain: rest,
                    endpoint: self.endpoint,
                };
                middleware.handle(ctx, request, next).await
            }
            None => self.endpoint.call(ctx, request).await,
        }
    }

    /// Number of middleware still to run.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.chain.iter().map(|m| m.name()).collect();
        f.debug_struct("Next").field("chain", &names).finish_non_exhaustive()
    }
}
