//! # Trellis Test
//!
//! In-memory testing for Trellis applications. A [`TestClient`] feeds
//! requests directly into an assembled `App`, so tests exercise the full
//! middleware chain, route table, and execution pipeline without opening a
//! socket.
//!
//! ```rust,ignore
//! use trellis_test::TestClient;
//!
//! #[tokio::test]
//! async fn creates_user() {
//!     let client = TestClient::new(app());
//!     client
//!         .post("/v1/users")
//!         .json(&json!({"name": "ada"}))
//!         .send()
//!         .await
//!         .assert_status(StatusCode::OK);
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::TestRequestBuilder;
pub use response::TestResponse;
