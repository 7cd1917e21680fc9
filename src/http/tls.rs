//! HTTPS listener built on rustls

use crate::core::service::ServiceError;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Load a PEM certificate chain and private key into a server configuration
pub fn load_tls_config(cert: &Path, key: &Path) -> Result<Arc<ServerConfig>, ServiceError> {
    let tls_error = |what: &str, path: &Path, e: &dyn std::fmt::Display| {
        ServiceError::Config(format!("{} {}: {}", what, path.display(), e))
    };

    let certs = CertificateDer::pem_file_iter(cert)
        .map_err(|e| tls_error("cannot read certificate", cert, &e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error("invalid certificate", cert, &e))?;
    if certs.is_empty() {
        return Err(ServiceError::Config(format!(
            "no certificate found in {}",
            cert.display()
        )));
    }
    let private_key =
        PrivateKeyDer::from_pem_file(key).map_err(|e| tls_error("cannot read key", key, &e))?;

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| ServiceError::Config(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs, private_key)
            .map_err(|e| ServiceError::Config(format!("certificate rejected: {}", e)))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Accept TLS connections and serve `app` on each until shutdown
pub async fn serve_tls(
    listener: TcpListener,
    app: Router,
    config: Arc<ServerConfig>,
) -> Result<(), ServiceError> {
    let acceptor = TlsAcceptor::from(config);
    let shutdown = crate::http::server::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("TLS listener stopped");
                return Ok(());
            }
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!("TLS handshake with {} failed: {}", peer, e);
                    return;
                }
            };

            let service = TowerToHyperService::new(app);
            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Connection with {} ended: {}", peer, e);
            }
        });
    }
}
