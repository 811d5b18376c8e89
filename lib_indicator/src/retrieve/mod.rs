//! # Data Retrieval Module
//!
//! HTTP-based snapshot retrieval for the engine.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: a generic `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, with automatic retries and exponential backoff.
//! - **`plural_api`**: the Simply Plural REST collaborator implementing
//!   [`crate::engine::RosterSource`] on top of `ApiClient`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Generic HTTP API client with retry middleware for resilient network requests.
pub mod ky_http;
/// The REST endpoints a bootstrap snapshot is read from.
pub mod plural_api;

pub use ky_http::{ApiClient, ApiResponse};
pub use plural_api::PluralApi;
