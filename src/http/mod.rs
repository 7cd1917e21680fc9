//! HTTP server implementation for the package registry
//!
//! Exposes the pacman-compatible push, fetch and remove endpoints with axum,
//! over plain HTTP or rustls.

pub mod errors;
pub mod handlers;
pub mod models;
pub mod server;
pub mod tls;

pub use errors::{HttpError, HttpResult};
pub use models::StatusResponse;
/// Re-export commonly used types
pub use server::{router, RegistryServer};
