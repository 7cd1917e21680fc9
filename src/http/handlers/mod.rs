//! HTTP request handlers

pub mod packages;
pub mod status;

// Re-export AppState (used by all handlers)
pub use status::AppState;
