//! Core registry modules

pub mod freshness;
pub mod keys;
pub mod metadata;
pub mod repo_db;
pub mod service;
pub mod signature;

pub use freshness::FreshnessWindow;
pub use keys::RecordKeys;
pub use metadata::{extract_metadata, MetadataError, PackageMetadata};
pub use repo_db::{build_repo_db, read_repo_db, RepoDbEntry, RepoDbError, RepoScope};
pub use service::{
    PushRequest, RegistryConfig, RegistryService, RemoveRequest, RepoFile, ServiceError,
};
pub use signature::{AuthError, Authenticator};
