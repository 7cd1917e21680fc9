//! Axum HTTP server implementation

use crate::core::service::{RegistryConfig, RegistryService, ServiceError};
use crate::http::handlers::{packages, status, AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, put},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Build the registry router
pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/api/status", get(status::status))
        .route("/api/packages/:owner/arch/push", put(packages::push_package))
        .route(
            "/api/packages/:owner/arch/delete",
            delete(packages::remove_package),
        )
        .route(
            "/api/packages/:owner/arch/:distro/:arch/:file",
            get(packages::fetch_file),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Package registry HTTP server
pub struct RegistryServer {
    state: AppState,
    addr: SocketAddr,
    body_limit: usize,
    tls: Option<(PathBuf, PathBuf)>,
}

impl RegistryServer {
    /// Create a new server instance
    pub fn new(service: Arc<RegistryService>, config: &RegistryConfig) -> Result<Self, ServiceError> {
        let addr = Self::parse_address(&config.host, config.port).map_err(ServiceError::Config)?;
        let tls = match (&config.tls_cert, &config.tls_key) {
            (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
            _ => None,
        };

        Ok(Self {
            state: AppState::new(service, config.name.clone()),
            addr,
            body_limit: config.max_package_size,
            tls,
        })
    }

    /// Parse and normalize host:port into a SocketAddr
    fn parse_address(host: &str, port: u16) -> Result<SocketAddr, String> {
        let normalized_host = Self::normalize_host(host);

        // IPv6 addresses need brackets
        let addr_str = if normalized_host.contains(':') {
            format!("[{}]:{}", normalized_host, port)
        } else {
            format!("{}:{}", normalized_host, port)
        };

        addr_str.parse().map_err(|_| {
            format!(
                "Unable to parse address '{}'. Use IP addresses like '127.0.0.1', '0.0.0.0' or '::1'",
                addr_str
            )
        })
    }

    fn normalize_host(host: &str) -> String {
        match host {
            "localhost" => "127.0.0.1".to_string(),
            "::1" | "[::1]" => "::1".to_string(),
            "::" | "[::]" => "::".to_string(),
            _ => host.to_string(),
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone(), self.body_limit)
    }

    /// Start the server and run until ctrl-c or SIGTERM
    pub async fn serve(self) -> Result<(), ServiceError> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        let actual_addr = listener.local_addr()?;

        match &self.tls {
            Some((cert, key)) => {
                let tls_config = crate::http::tls::load_tls_config(cert, key)?;
                info!("Registry listening on https://{}", actual_addr);
                crate::http::tls::serve_tls(listener, app, tls_config).await
            }
            None => {
                info!("Registry listening on http://{}", actual_addr);
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown_signal())
                    .await?;
                Ok(())
            }
        }
    }

    /// Get server address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Resolves on ctrl-c or SIGTERM
pub(crate) async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
