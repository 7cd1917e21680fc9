//! Main registry service implementation

use crate::core::freshness::FreshnessWindow;
use crate::core::keys::{
    package_filename, validate_component, RecordKeys, PACKAGE_SUFFIX, SIGNATURE_SUFFIX,
};
use crate::core::metadata::{extract_metadata, MetadataError, PackageMetadata};
use crate::core::repo_db::{build_repo_db, RepoDbError, RepoScope};
use crate::core::signature::{AuthError, Authenticator};
use crate::storage::{ContentStore, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Public domain name, used as package URL fallback
    pub name: String,

    /// Address to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// Path of the redb database file
    pub db_path: PathBuf,

    /// Directory of owner public keys, laid out as `<owner>/<email>`
    pub key_dir: PathBuf,

    /// PEM certificate chain; enables TLS together with `tls_key`
    pub tls_cert: Option<PathBuf>,

    /// PEM private key
    pub tls_key: Option<PathBuf>,

    /// Largest accepted request body in bytes
    pub max_package_size: usize,

    /// Accepted age of a push timestamp
    pub push_window_secs: u64,

    /// Accepted age of a remove timestamp
    pub remove_window_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name: "localhost".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            db_path: PathBuf::from("./data/registry.redb"),
            key_dir: PathBuf::from("./keys"),
            tls_cert: None,
            tls_key: None,
            max_package_size: 256 * 1024 * 1024,
            push_window_secs: FreshnessWindow::PUSH_SECS,
            remove_window_secs: FreshnessWindow::REMOVE_SECS,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err(ServiceError::Config(
                "tls_cert and tls_key must be set together".to_string(),
            ));
        }
        if self.max_package_size == 0 {
            return Err(ServiceError::Config(
                "max_package_size must be greater than zero".to_string(),
            ));
        }
        if self.push_window_secs == 0 || self.remove_window_secs == 0 {
            return Err(ServiceError::Config(
                "freshness windows must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls_cert.is_some() && self.tls_key.is_some()
    }
}

/// Main service error type
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Stale request: {0}")]
    StaleRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Corrupt index entry: {0}")]
    CorruptIndexEntry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<RepoDbError> for ServiceError {
    fn from(err: RepoDbError) -> Self {
        match err {
            RepoDbError::Storage(e) => ServiceError::Storage(e),
            RepoDbError::CorruptIndexEntry(key) => ServiceError::CorruptIndexEntry(key),
            RepoDbError::Archive(e) => ServiceError::Io(e),
        }
    }
}

/// A signed package upload
#[derive(Debug, Clone)]
pub struct PushRequest<'a> {
    pub owner: &'a str,
    pub email: &'a str,
    pub distro: &'a str,
    pub filename: &'a str,
    /// RFC 3339 timestamp as sent by the client
    pub time: &'a str,
    /// Hex signature over the package body
    pub pkgsign: &'a str,
    /// Hex signature over `owner + name + time`
    pub metasign: &'a str,
    pub body: &'a [u8],
}

/// A signed package removal
#[derive(Debug, Clone)]
pub struct RemoveRequest<'a> {
    pub owner: &'a str,
    pub email: &'a str,
    pub distro: &'a str,
    pub target: &'a str,
    pub version: &'a str,
    pub arch: &'a str,
    pub time: &'a str,
    /// Raw signature over `owner + target + time`
    pub signature: &'a [u8],
}

/// Kind of file requested from a repository path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoFile {
    Package,
    Signature,
    Database,
}

impl RepoFile {
    /// Classify a requested file name by its suffix
    pub fn classify(file: &str) -> Option<Self> {
        if file.ends_with(PACKAGE_SUFFIX) {
            Some(RepoFile::Package)
        } else if file.ends_with(&format!("{PACKAGE_SUFFIX}{SIGNATURE_SUFFIX}")) {
            Some(RepoFile::Signature)
        } else if file.ends_with(".db") || file.ends_with(".db.tar.gz") {
            Some(RepoFile::Database)
        } else {
            None
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            RepoFile::Package => "application/zstd",
            RepoFile::Signature => "application/octet-stream",
            RepoFile::Database => "application/gzip",
        }
    }
}

/// Package registry service
///
/// Owns the store and applies the push, fetch and remove protocols on top
/// of it. Cheap to clone.
#[derive(Clone)]
pub struct RegistryService {
    store: Arc<dyn ContentStore>,
    authenticator: Authenticator,
    domain: String,
    push_window: FreshnessWindow,
    remove_window: FreshnessWindow,
}

impl RegistryService {
    pub fn new(store: Arc<dyn ContentStore>, config: &RegistryConfig) -> Self {
        Self {
            authenticator: Authenticator::new(store.clone()),
            store,
            domain: config.name.clone(),
            push_window: FreshnessWindow::from_secs(config.push_window_secs),
            remove_window: FreshnessWindow::from_secs(config.remove_window_secs),
        }
    }

    /// Authenticate and store an uploaded package
    pub async fn push(
        &self,
        request: PushRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<PackageMetadata, ServiceError> {
        validate_component("owner", request.owner)?;
        validate_component("email", request.email)?;
        validate_component("distro", request.distro)?;
        validate_component("filename", request.filename)?;

        let package_signature = decode_hex("pkgsign", request.pkgsign)?;
        if request.body.is_empty() {
            return Err(ServiceError::MalformedRequest(
                "package body is empty".to_string(),
            ));
        }
        self.push_window.check(request.time, now)?;
        let metadata_signature = decode_hex("metasign", request.metasign)?;

        // The body signature needs no metadata, so a foreign signer is
        // rejected before the archive is parsed.
        self.authenticator
            .verify(
                request.body,
                &package_signature,
                request.owner,
                request.email,
            )
            .await?;

        let metadata = extract_metadata(
            request.filename,
            request.distro,
            &self.domain,
            request.body,
        )?
        .with_signature(&package_signature);

        let signed_meta = format!("{}{}{}", request.owner, metadata.name, request.time);
        self.authenticator
            .verify(
                signed_meta.as_bytes(),
                &metadata_signature,
                request.owner,
                request.email,
            )
            .await?;

        let keys = RecordKeys::new(request.distro, request.owner, request.filename);
        let descriptor = metadata.descriptor();
        let [artifact, signature, description] = keys.write_order();
        self.store
            .save_all(&[
                (artifact, request.body),
                (signature, package_signature.as_slice()),
                (description, descriptor.as_bytes()),
            ])
            .await?;

        info!(
            "Stored {} {} for {} in {}",
            metadata.name, metadata.version, request.owner, request.distro
        );
        Ok(metadata)
    }

    /// Authenticate and delete a package; removing an absent package succeeds
    pub async fn remove(
        &self,
        request: RemoveRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        validate_component("owner", request.owner)?;
        validate_component("email", request.email)?;
        validate_component("distro", request.distro)?;
        validate_component("target", request.target)?;
        validate_component("version", request.version)?;
        validate_component("arch", request.arch)?;

        self.remove_window.check(request.time, now)?;

        let signed = format!("{}{}{}", request.owner, request.target, request.time);
        self.authenticator
            .verify(
                signed.as_bytes(),
                request.signature,
                request.owner,
                request.email,
            )
            .await?;

        let filename = package_filename(request.target, request.version, request.arch);
        let keys = RecordKeys::new(request.distro, request.owner, &filename);
        self.store.remove_all(&keys.remove_order()).await?;

        info!(
            "Removed {} from {}/{}",
            filename, request.distro, request.owner
        );
        Ok(())
    }

    /// Load a stored package or signature record
    pub async fn fetch_file(
        &self,
        distro: &str,
        owner: &str,
        file: &str,
    ) -> Result<Vec<u8>, ServiceError> {
        validate_component("distro", distro)?;
        validate_component("owner", owner)?;
        validate_component("file", file)?;

        let key = crate::core::keys::join(distro, owner, file);
        self.store.load(&key).await.map_err(|e| match e {
            StorageError::NotFound(_) => ServiceError::NotFound(file.to_string()),
            other => ServiceError::Storage(other),
        })
    }

    /// Synthesize the repository database of a scope
    pub async fn fetch_db(&self, scope: &RepoScope) -> Result<Vec<u8>, ServiceError> {
        validate_component("distro", &scope.distro)?;
        validate_component("owner", &scope.owner)?;
        validate_component("arch", &scope.arch)?;

        let db = build_repo_db(self.store.as_ref(), scope).await?;
        debug!("Database for {:?} is {} bytes", scope, db.len());
        Ok(db)
    }
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, ServiceError> {
    hex::decode(value.trim())
        .map_err(|e| ServiceError::MalformedRequest(format!("invalid {} header: {}", field, e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::repo_db::read_repo_db;
    use crate::storage::MemoryStore;
    use crate::test_utils::{build_package, pkginfo, public_key_armor, sign, signing_key};

    const OWNER: &str = "alice";
    const EMAIL: &str = "alice@example.com";
    const TIME: &str = "2024-05-01T12:00:00Z";

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:10Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn service() -> (RegistryService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new().with_public_key(
            OWNER,
            EMAIL,
            &public_key_armor(&signing_key(1)),
        ));
        let service = RegistryService::new(store.clone(), &RegistryConfig::default());
        (service, store)
    }

    struct SignedPush {
        filename: String,
        body: Vec<u8>,
        pkgsign: String,
        metasign: String,
    }

    fn signed_push(name: &str, version: &str, seed: u8) -> SignedPush {
        let key = signing_key(seed);
        let body = build_package(&pkginfo(name, version, "x86_64"));
        SignedPush {
            filename: package_filename(name, version, "x86_64"),
            pkgsign: hex::encode(sign(&key, &body)),
            metasign: hex::encode(sign(&key, format!("{OWNER}{name}{TIME}").as_bytes())),
            body,
        }
    }

    fn push_request<'a>(push: &'a SignedPush, time: &'a str) -> PushRequest<'a> {
        PushRequest {
            owner: OWNER,
            email: EMAIL,
            distro: "archlinux",
            filename: &push.filename,
            time,
            pkgsign: &push.pkgsign,
            metasign: &push.metasign,
            body: &push.body,
        }
    }

    #[tokio::test]
    async fn test_push_fetch_remove_round_trip() {
        let (service, store) = service();
        let push = signed_push("demo", "1.0", 1);

        let md = service.push(push_request(&push, TIME), now()).await.unwrap();
        assert_eq!(md.name, "demo");
        assert!(md.pgp_signature.is_some());
        assert_eq!(store.len().await, 3);

        let fetched = service
            .fetch_file("archlinux", OWNER, &push.filename)
            .await
            .unwrap();
        assert_eq!(fetched, push.body);

        let db = service
            .fetch_db(&RepoScope::new("archlinux", OWNER, "x86_64"))
            .await
            .unwrap();
        assert_eq!(read_repo_db(&db).unwrap().len(), 1);

        let signature = sign(&signing_key(1), format!("{OWNER}demo{TIME}").as_bytes());
        service
            .remove(
                RemoveRequest {
                    owner: OWNER,
                    email: EMAIL,
                    distro: "archlinux",
                    target: "demo",
                    version: "1.0",
                    arch: "x86_64",
                    time: TIME,
                    signature: &signature,
                },
                now(),
            )
            .await
            .unwrap();
        assert!(store.is_empty().await);
        assert!(matches!(
            service.fetch_file("archlinux", OWNER, &push.filename).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_push_with_foreign_key_stores_nothing() {
        let (service, store) = service();
        let push = signed_push("demo", "1.0", 9);

        let err = service
            .push(push_request(&push, TIME), now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Auth(AuthError::SignatureMismatch { .. })
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_push_validation_order() {
        let (service, _) = service();
        let push = signed_push("demo", "1.0", 1);

        let bad_hex = PushRequest {
            pkgsign: "zz",
            ..push_request(&push, "not a time")
        };
        assert!(matches!(
            service.push(bad_hex, now()).await,
            Err(ServiceError::MalformedRequest(msg)) if msg.contains("pkgsign")
        ));

        let stale = push_request(&push, "2024-05-01T10:00:00Z");
        assert!(matches!(
            service.push(stale, now()).await,
            Err(ServiceError::StaleRequest(_))
        ));

        let garbage_sign = hex::encode(sign(&signing_key(1), b"not a package"));
        let garbage = PushRequest {
            body: b"not a package",
            pkgsign: &garbage_sign,
            ..push_request(&push, TIME)
        };
        assert!(matches!(
            service.push(garbage, now()).await,
            Err(ServiceError::Metadata(MetadataError::UnsupportedFormat(_)))
        ));
    }

    #[tokio::test]
    async fn test_foreign_signer_is_rejected_before_extraction() {
        let (service, store) = service();
        let pkgsign = hex::encode(sign(&signing_key(9), b"not a package"));
        let request = PushRequest {
            owner: OWNER,
            email: EMAIL,
            distro: "archlinux",
            filename: "demo-1.0-x86_64.pkg.tar.zst",
            time: TIME,
            pkgsign: &pkgsign,
            metasign: "00",
            body: b"not a package",
        };

        let err = service.push(request, now()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Auth(AuthError::SignatureMismatch { .. })
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_absent_package_succeeds() {
        let (service, store) = service();
        let signature = sign(&signing_key(1), format!("{OWNER}ghost{TIME}").as_bytes());
        service
            .remove(
                RemoveRequest {
                    owner: OWNER,
                    email: EMAIL,
                    distro: "archlinux",
                    target: "ghost",
                    version: "1.0",
                    arch: "x86_64",
                    time: TIME,
                    signature: &signature,
                },
                now(),
            )
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_uses_short_window() {
        let (service, _) = service();
        let time = "2024-05-01T11:58:00Z";
        let signature = sign(&signing_key(1), format!("{OWNER}demo{time}").as_bytes());
        let err = service
            .remove(
                RemoveRequest {
                    owner: OWNER,
                    email: EMAIL,
                    distro: "archlinux",
                    target: "demo",
                    version: "1.0",
                    arch: "x86_64",
                    time,
                    signature: &signature,
                },
                now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::StaleRequest(_)));
    }

    #[test]
    fn test_repo_file_classification() {
        assert_eq!(
            RepoFile::classify("demo-1.0-x86_64.pkg.tar.zst"),
            Some(RepoFile::Package)
        );
        assert_eq!(
            RepoFile::classify("demo-1.0-x86_64.pkg.tar.zst.sig"),
            Some(RepoFile::Signature)
        );
        assert_eq!(RepoFile::classify("archlinux.db"), Some(RepoFile::Database));
        assert_eq!(
            RepoFile::classify("archlinux.db.tar.gz"),
            Some(RepoFile::Database)
        );
        assert_eq!(RepoFile::classify("archlinux.files"), None);
    }

    #[test]
    fn test_config_validation() {
        assert!(RegistryConfig::default().validate().is_ok());

        let half_tls = RegistryConfig {
            tls_cert: Some(PathBuf::from("cert.pem")),
            ..RegistryConfig::default()
        };
        assert!(matches!(half_tls.validate(), Err(ServiceError::Config(_))));

        let no_window = RegistryConfig {
            remove_window_secs: 0,
            ..RegistryConfig::default()
        };
        assert!(no_window.validate().is_err());
    }
}
