//! # Trellis Core
//!
//! Core types shared by every Trellis crate.
//!
//! - [`HttpError`] - the canonical error envelope returned to clients
//! - [`ApiError`] / [`ApiResponse`] - what handlers return
//! - [`RequestContext`] - per-request deadline, identity, and attachments
//! - [`TraceId`] / [`RequestId`] - identifiers stitched into responses and logs
//! - [`Validate`] - the validation contract implemented by `#[derive(Validate)]`
//! - [`Notification`] / [`Notifier`] - side-channel notices and their dispatch seam
//! - [`Cache`] - cache handle carried on the request context

#![doc(html_root_url = "https://docs.rs/trellis-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cache;
mod context;
mod error;
mod ids;
pub mod notification;
mod response;
pub mod validate;

pub use cache::{Cache, MemoryCache};
pub use context::{Claims, RequestContext};
pub use error::{codes, ApiError, HttpError};
pub use ids::{RequestId, TraceId, REQUEST_ID_LEN};
pub use notification::{
    Notification, NotificationField, NotificationKind, Notifier, SLACK_SINK, TELEGRAM_SINK,
};
pub use response::{ApiResponse, HandlerResult, Paginated, ServiceInfo};
pub use validate::{FieldError, Nullable, Validate, ValidationErrors, ValidationMode};
