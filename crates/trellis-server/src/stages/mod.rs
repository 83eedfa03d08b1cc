//! Built-in middleware stages.

pub mod request_id;
pub mod secure_headers;

pub use request_id::{RequestIdMiddleware, REQUEST_ID_HEADER};
pub use secure_headers::SecureHeadersMiddleware;
