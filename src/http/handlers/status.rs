//! Status endpoint and shared handler state

use crate::core::service::RegistryService;
use crate::http::models::StatusResponse;
use axum::{extract::State, Json};
use std::sync::Arc;
use std::time::SystemTime;

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RegistryService>,
    pub name: String,
    pub start_time: SystemTime,
}

impl AppState {
    pub fn new(service: Arc<RegistryService>, name: impl Into<String>) -> Self {
        Self {
            service,
            name: name.into(),
            start_time: SystemTime::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or_default()
            .as_secs()
    }
}

/// GET /api/status - Service status endpoint
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        name: state.name.clone(),
        version: crate::VERSION.to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}
