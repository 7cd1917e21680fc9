//! Composite store keys for package records
//!
//! Every record lives under `"{distro}/{owner}/{filename}"`. Signature and
//! description records append a fixed suffix to the artifact key. `/` is
//! rejected inside every component so the join can always be split again.

use crate::core::service::ServiceError;

/// File suffix of package archives accepted by the registry
pub const PACKAGE_SUFFIX: &str = ".pkg.tar.zst";

/// Suffix appended to an artifact key for its detached signature
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Suffix appended to an artifact key for its database description
pub const DESCRIPTION_SUFFIX: &str = ".desc";

const SEPARATOR: char = '/';

/// Validate a single key component taken from a header or path segment
pub fn validate_component(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::MalformedRequest(format!(
            "{} must not be empty",
            field
        )));
    }
    if value.contains(SEPARATOR) {
        return Err(ServiceError::MalformedRequest(format!(
            "{} must not contain '{}'",
            field, SEPARATOR
        )));
    }
    Ok(())
}

/// Key of the artifact record stored for `filename`
pub fn join(distro: &str, owner: &str, filename: &str) -> String {
    format!("{distro}{SEPARATOR}{owner}{SEPARATOR}{filename}")
}

/// The three record keys of one package in write order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKeys {
    pub artifact: String,
    pub signature: String,
    pub description: String,
}

impl RecordKeys {
    pub fn new(distro: &str, owner: &str, filename: &str) -> Self {
        let artifact = join(distro, owner, filename);
        Self {
            signature: format!("{artifact}{SIGNATURE_SUFFIX}"),
            description: format!("{artifact}{DESCRIPTION_SUFFIX}"),
            artifact,
        }
    }

    /// Keys in the order they are written
    pub fn write_order(&self) -> [&str; 3] {
        [&self.artifact, &self.signature, &self.description]
    }

    /// Keys in the order they are removed
    pub fn remove_order(&self) -> [&str; 3] {
        [&self.description, &self.signature, &self.artifact]
    }
}

/// Canonical package filename for a name, version and architecture
pub fn package_filename(name: &str, version: &str, arch: &str) -> String {
    format!("{name}-{version}-{arch}{PACKAGE_SUFFIX}")
}

/// Prefix shared by every record of one owner within a distribution
pub fn scope_prefix(distro: &str, owner: &str) -> String {
    format!("{distro}{SEPARATOR}{owner}{SEPARATOR}")
}

/// A description record key split back into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionKey<'a> {
    pub distro: &'a str,
    pub owner: &'a str,
    /// `name-version-arch` without the package suffix
    pub stem: &'a str,
    pub arch: &'a str,
}

impl<'a> DescriptionKey<'a> {
    /// Split a description key. Returns `None` for any other record kind.
    pub fn parse(key: &'a str) -> Option<Self> {
        let artifact = key.strip_suffix(DESCRIPTION_SUFFIX)?;
        let mut parts = artifact.splitn(3, SEPARATOR);
        let distro = parts.next()?;
        let owner = parts.next()?;
        let filename = parts.next()?;
        if filename.contains(SEPARATOR) {
            return None;
        }
        let stem = filename.strip_suffix(PACKAGE_SUFFIX)?;
        let (_, arch) = stem.rsplit_once('-')?;
        if arch.is_empty() {
            return None;
        }
        Some(Self {
            distro,
            owner,
            stem,
            arch,
        })
    }

    /// Recover the package version given its name
    ///
    /// The stem is `name-version-arch`; names may contain dashes, so the
    /// name is needed to find where the version starts.
    pub fn version_for(&self, name: &str) -> Option<&'a str> {
        let rest = self.stem.strip_prefix(name)?.strip_prefix('-')?;
        let version = rest.strip_suffix(self.arch)?.strip_suffix('-')?;
        if version.is_empty() {
            None
        } else {
            Some(version)
        }
    }
}
