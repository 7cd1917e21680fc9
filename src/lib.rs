//! # pack-registry
//!
//! A private package registry for Arch Linux style binary packages. Owners
//! push signed `.pkg.tar.zst` archives; the registry checks both signatures
//! against the owner's registered public key, stores the package and serves
//! it back together with a pacman repository database synthesized per
//! request.
//!
//! ## Architecture
//!
//! - [`storage`]: key/value persistence of package records and owner keys
//! - [`core::metadata`]: `.PKGINFO` extraction and pacman `desc` rendering
//! - [`core::signature`]: detached signature verification
//! - [`core::repo_db`]: repository database synthesis
//! - [`http`]: push, fetch and remove endpoints
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pack_registry::http::RegistryServer;
//! use pack_registry::storage::RedbStore;
//! use pack_registry::{RegistryConfig, RegistryService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RegistryConfig::default();
//!
//!     let store = RedbStore::open(&config.db_path)?;
//!     store.import_public_keys(&config.key_dir).await?;
//!
//!     let service = Arc::new(RegistryService::new(Arc::new(store), &config));
//!     RegistryServer::new(service, &config)?.serve().await?;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod http;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_utils;

pub use core::metadata::{extract_metadata, MetadataError, PackageMetadata};
pub use core::repo_db::{build_repo_db, read_repo_db, RepoDbEntry, RepoScope};
pub use core::service::{RegistryConfig, RegistryService, ServiceError};
pub use core::signature::{AuthError, Authenticator};
pub use storage::{ContentStore, MemoryStore, RedbStore, StorageError};

/// Version of the registry
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "pack_registry=info";

/// Initialize logging (safe for testing)
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LOG_FILTER);
}

/// Initialize logging with a fallback filter for when `RUST_LOG` is unset
pub fn init_logging_with_default(default_filter: &str) {
    // Only initialize logging once
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

        let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();

        // This will fail silently if already initialized
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
