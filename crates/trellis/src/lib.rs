//! # Trellis
//!
//! Scaffolding for HTTP JSON APIs with uniform request handling.
//!
//! - Every handler runs on its own task under a per-request deadline; an
//!   expired deadline answers `504 timeout`.
//! - Returned errors become a JSON envelope with a fresh trace id.
//! - Panics are caught, answered with a 500 envelope, and reported with a
//!   backtrace to every active notification sink.
//! - The server drains in-flight requests on SIGINT/SIGTERM/SIGHUP.
//! - Spreadsheet and CSV uploads import concurrently through a worker pool.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trellis::prelude::*;
//!
//! #[derive(serde::Deserialize, Validate)]
//! struct NewUser {
//!     #[validate(required, max = 64)]
//!     name: String,
//! }
//!
//! async fn create_user(req: Request, _ctx: RequestContext) -> HandlerResult {
//!     let user: NewUser = req.body().await?;
//!     Ok(ApiResponse::ok("created").with_data(serde_json::json!({"name": user.name})))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_dotenv()?.load()?;
//!     init_logging(&config.log_config())?;
//!
//!     let app = AppBuilder::from_config(&config)
//!         .notifier(Arc::new(Fanout::from_settings(&config.notifications)))
//!         .controller(Controller::new("/users").route(Route::post(create_user)))
//!         .build();
//!
//!     Server::new(app, ServerConfig::from(&config)).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! `#[derive(Validate)]` expands to paths under `trellis_core`, so crates
//! using the derive also depend on `trellis-core`.

#![doc(html_root_url = "https://docs.rs/trellis/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use trellis_config as config;
pub use trellis_core as core;
pub use trellis_extract as extract;
pub use trellis_importer as importer;
pub use trellis_notify as notify;
pub use trellis_server as server;
pub use trellis_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    pub use trellis_core::{
        ApiError, ApiResponse, Claims, HandlerResult, HttpError, Notification, NotificationKind,
        Notifier, Paginated, RequestContext, ServiceInfo, TraceId, Validate,
    };

    pub use trellis_macros::Validate;

    pub use trellis_extract::{Request, UploadedFile};

    pub use trellis_notify::{Fanout, SlackSink, TelegramSink};

    pub use trellis_server::{
        App, AppBuilder, Controller, Middleware, Next, Route, Server, ServerConfig,
    };

    pub use trellis_importer::{
        FileKind, ImportJob, ImportSummary, NotifyPreference, RowProcessor, Transaction,
        TransactionFactory,
    };

    pub use trellis_config::{AppConfig, ConfigLoader};

    pub use trellis_telemetry::logging::init_logging;
}
