//! Pacman repository database synthesis
//!
//! The database is never stored. Each request folds the description records
//! of one `(distro, owner, arch)` scope into a gzip-compressed tar holding a
//! `name-version/desc` file per package, which is the layout pacman reads.

use crate::core::keys::{scope_prefix, DescriptionKey, DESCRIPTION_SUFFIX, PACKAGE_SUFFIX};
use crate::core::metadata::parse_descriptor;
use crate::storage::{ContentStore, StorageError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Read;
use thiserror::Error;
use tracing::{debug, warn};

/// Architecture of packages installable everywhere
pub const ANY_ARCH: &str = "any";

#[derive(Debug, Error)]
pub enum RepoDbError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Corrupt index entry: {0}")]
    CorruptIndexEntry(String),

    #[error("Failed to write repository database: {0}")]
    Archive(#[from] std::io::Error),
}

/// Packages visible in one repository database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoScope {
    pub distro: String,
    pub owner: String,
    pub arch: String,
}

impl RepoScope {
    pub fn new(distro: impl Into<String>, owner: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            distro: distro.into(),
            owner: owner.into(),
            arch: arch.into(),
        }
    }

    fn includes_arch(&self, arch: &str) -> bool {
        arch == self.arch || arch == ANY_ARCH
    }
}

/// One package entry of a repository database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDbEntry {
    pub name: String,
    pub version: String,
    pub desc: String,
}

/// Build the repository database for `scope` from the store's description records
pub async fn build_repo_db(
    store: &dyn ContentStore,
    scope: &RepoScope,
) -> Result<Vec<u8>, RepoDbError> {
    let prefix = scope_prefix(&scope.distro, &scope.owner);
    let keys = store.keys().await?;

    let mut entries = Vec::new();
    for key in keys.iter().filter(|k| k.starts_with(&prefix)) {
        if !key.ends_with(DESCRIPTION_SUFFIX) {
            continue;
        }
        let Some(parsed) = DescriptionKey::parse(key) else {
            warn!("Unparseable description key {}", key);
            return Err(RepoDbError::CorruptIndexEntry(format!(
                "{} (key is not distro/owner/name-version-arch{}{})",
                key, PACKAGE_SUFFIX, DESCRIPTION_SUFFIX
            )));
        };
        if !scope.includes_arch(parsed.arch) {
            continue;
        }

        let data = match store.load(key).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                debug!("Description {} removed during index scan", key);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        entries.push(index_entry(key, &parsed, data)?);
    }

    debug!(
        "Synthesized database for {}/{}/{} with {} packages",
        scope.distro,
        scope.owner,
        scope.arch,
        entries.len()
    );
    write_archive(&entries)
}

fn index_entry(
    key: &str,
    parsed: &DescriptionKey<'_>,
    data: Vec<u8>,
) -> Result<RepoDbEntry, RepoDbError> {
    let corrupt = |reason: &str| {
        warn!("Skipping database build, {}: {}", key, reason);
        RepoDbError::CorruptIndexEntry(format!("{} ({})", key, reason))
    };

    let desc = String::from_utf8(data).map_err(|_| corrupt("descriptor is not UTF-8"))?;
    let fields = parse_descriptor(&desc);
    let name = fields.name.ok_or_else(|| corrupt("descriptor has no %NAME%"))?;
    let version = parsed
        .version_for(&name)
        .ok_or_else(|| corrupt("key does not start with the package name"))?;
    if fields.version.as_deref() != Some(version) {
        return Err(corrupt("descriptor %VERSION% does not match key"));
    }

    Ok(RepoDbEntry {
        version: version.to_string(),
        name,
        desc,
    })
}

fn write_archive(entries: &[RepoDbEntry]) -> Result<Vec<u8>, RepoDbError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        let dir = format!("{}-{}", entry.name, entry.version);

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        header.set_cksum();
        builder.append_data(&mut header, format!("{dir}/"), std::io::empty())?;

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(entry.desc.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, format!("{dir}/desc"), entry.desc.as_bytes())?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Decode a repository database back into its package entries
pub fn read_repo_db(data: &[u8]) -> Result<Vec<RepoDbEntry>, RepoDbError> {
    let mut archive = tar::Archive::new(GzDecoder::new(data));
    let mut entries = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type() != tar::EntryType::Regular {
            continue;
        }
        let path = entry.path()?.to_string_lossy().into_owned();
        if !path.ends_with("/desc") {
            continue;
        }

        let mut desc = String::new();
        entry
            .read_to_string(&mut desc)
            .map_err(|_| RepoDbError::CorruptIndexEntry(path.clone()))?;
        let fields = parse_descriptor(&desc);
        match (fields.name, fields.version) {
            (Some(name), Some(version)) => entries.push(RepoDbEntry {
                name,
                version,
                desc,
            }),
            _ => return Err(RepoDbError::CorruptIndexEntry(path)),
        }
    }

    Ok(entries)
}
