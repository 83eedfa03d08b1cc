//! # Trellis Extract
//!
//! The handler-facing request view.
//!
//! A [`Request`] wraps the method, URI, headers, buffered body, and matched
//! path parameters of one inbound request and exposes typed accessors:
//!
//! - [`Request::param`] / [`Request::param_or`] - path parameters
//! - [`Request::query`] - typed query decoding
//! - [`Request::headers`] - typed header decoding
//! - [`Request::body`] - typed body decoding by `Content-Type`
//! - [`Request::file`] - multipart file retrieval
//!
//! Every typed accessor validates the decoded value; failures convert into
//! the error envelope through [`DecodeError`].

#![doc(html_root_url = "https://docs.rs/trellis-extract/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod multipart;
mod params;
mod request;

pub use error::DecodeError;
pub use multipart::{MultipartConfig, MultipartForm, UploadedFile, DEFAULT_MAX_MULTIPART_SIZE};
pub use params::PathParams;
pub use request::{RemoteAddr, Request};
