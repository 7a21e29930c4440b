//! Client module
//!
//! This module provides the `Client` abstraction over the proxy endpoints, with an
//! HTTP implementation and an in-process one.

mod http;
mod service;
mod trait_def;

// Re-export the trait and types
pub use http::{ClientConfig, ClientError, HttpClientImpl};
pub use service::ServiceClient;
pub use trait_def::Client;
