//! # Trellis Server
//!
//! Request execution for Trellis services:
//!
//! - single-write response construction and the success/error bodies
//! - versioned routes grouped under controllers, with stacked middleware
//! - the execution pipeline: per-request deadline, handler on its own task,
//!   panic containment, failure notices
//! - the HTTP/1 listener with optional TLS and signal-driven graceful drain
//!
//! ## Example
//!
//! ```rust,no_run
//! use trellis_core::{ApiResponse, HandlerResult, RequestContext};
//! use trellis_extract::Request;
//! use trellis_server::{App, Controller, Route, Server, ServerConfig};
//!
//! async fn hello(_req: Request, _ctx: RequestContext) -> HandlerResult {
//!     Ok(ApiResponse::ok("hello"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = App::builder()
//!         .controller(Controller::new("/greetings").route(Route::get(hello)))
//!         .build();
//!     Server::new(app, ServerConfig::default()).run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;
mod config;
mod error;
mod handler;
mod middleware;
pub mod panic;
pub mod pipeline;
mod route;
mod server;
mod shutdown;
pub mod stages;
mod writer;

pub use app::{App, AppBuilder, PING_PATH};
pub use config::{
    ServerConfig, ServerConfigBuilder, TlsConfig, DEFAULT_MAX_BODY_BYTES, SHUTDOWN_DRAIN_SECS,
};
pub use error::{ServerError, WriteError};
pub use handler::{BoxFuture, BoxedHandler, IntoHandler};
pub use middleware::{Endpoint, HttpRequest, Middleware, Next};
pub use pipeline::{Completion, Pipeline, DEFAULT_API_TIMEOUT};
pub use route::{Controller, Route, DEFAULT_VERSION};
pub use server::{BoundServer, Server};
pub use shutdown::{ShutdownReceiver, ShutdownSignal};
pub use writer::{
    error_response, json_response, success_response, text_response, Response, ResponseBody,
    ResponseWriter, SuccessBody, APPLICATION_JSON,
};
