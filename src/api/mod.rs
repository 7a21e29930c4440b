//! API module
//!
//! This module provides the HTTP surface of heartree: the server and the clients
//! that talk to it.

pub mod client;
pub mod server;

// Re-export commonly used types
pub use client::{Client, ClientConfig, ClientError, HttpClientImpl, ServiceClient};
pub use server::{router, serve, AppState, ServerConfig};
