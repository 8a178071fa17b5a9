//! # reflect-http
//!
//! The request capability reflect models use to reach their REST API.
//!
//! Production code builds a [`ReqwestTransport`] with a base URL:
//!
//! ```ignore
//! use reflect_http::{HttpRequest, ReqwestTransport, Transport};
//!
//! let transport = ReqwestTransport::with_default_timeout()?
//!     .with_base_url("https://api.example.com")?
//!     .with_default_header("Authorization", "Bearer token");
//!
//! let posts = transport.request(HttpRequest::get("/posts")).await?;
//! ```
//!
//! Tests use `mock::MockTransport` (feature `test-utils`), which answers
//! from a route table instead of the network.

pub mod error;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use error::Error;
pub use transport::{ReqwestTransport, Transport};
pub use types::{HttpRequest, HttpResponse, Method};
