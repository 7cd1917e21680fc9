//! Serve command implementation

use crate::cli::config::{load_config, ConfigOverrides};
use crate::cli::error::CliResult;
use clap::Args;
use pack_registry::http::RegistryServer;
use pack_registry::storage::RedbStore;
use pack_registry::RegistryService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Serve the registry via HTTP API
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Host to bind the server to
    #[arg(long, help = "Host to bind the server to")]
    host: Option<String>,

    /// Port to bind the server to
    #[arg(long, help = "Port to bind the server to")]
    port: Option<u16>,

    /// Public domain name of the registry
    #[arg(long, help = "Public domain name, used as package URL fallback")]
    name: Option<String>,

    #[arg(long, help = "Path of the registry database file")]
    db_path: Option<PathBuf>,

    #[arg(long, help = "Directory of owner public keys (<owner>/<email>)")]
    key_dir: Option<PathBuf>,

    #[arg(long, requires = "tls_key", help = "PEM certificate chain for HTTPS")]
    tls_cert: Option<PathBuf>,

    #[arg(long, requires = "tls_cert", help = "PEM private key for HTTPS")]
    tls_key: Option<PathBuf>,
}

impl ServeArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            db_path: self.db_path.clone(),
            key_dir: self.key_dir.clone(),
            tls_cert: self.tls_cert.clone(),
            tls_key: self.tls_key.clone(),
        }
    }
}

pub async fn execute_serve(config_file: Option<&Path>, args: ServeArgs) -> CliResult<()> {
    let config = load_config(config_file, &args.overrides())?;
    info!(
        "Starting pack-registry {} as {}",
        pack_registry::VERSION,
        config.name
    );

    let store = RedbStore::open(&config.db_path)?;
    if config.key_dir.is_dir() {
        store.import_public_keys(&config.key_dir).await?;
    } else {
        warn!(
            "Key directory {} does not exist, only previously imported keys are available",
            config.key_dir.display()
        );
    }

    let service = Arc::new(RegistryService::new(Arc::new(store), &config));
    let server = RegistryServer::new(service, &config)?;

    let scheme = if config.tls_enabled() { "https" } else { "http" };
    println!("pack-registry {}", pack_registry::VERSION);
    println!("  Database:     {}", config.db_path.display());
    println!("  Listening on: {}://{}", scheme, server.addr());

    // Blocks until shutdown
    server.serve().await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::error::CliError;

    #[tokio::test]
    async fn test_invalid_configuration_fails_before_binding() {
        let args = ServeArgs {
            host: None,
            port: Some(0),
            name: None,
            db_path: None,
            key_dir: None,
            tls_cert: None,
            tls_key: None,
        };
        let result = execute_serve(Some(Path::new("/nonexistent/registry.toml")), args).await;
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
