//! Package metadata extraction and pacman descriptor rendering
//!
//! A package is a zstd-compressed tar archive whose `.PKGINFO` control file
//! lists `key = value` pairs written by makepkg. The registry reads only that
//! entry, then renders the fields into the `desc` format pacman expects inside
//! a repository database.

use crate::core::keys::package_filename;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fmt::Display;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Name of the control file inside a package archive
pub const PKGINFO: &str = ".PKGINFO";

/// Upper bound on the size of a `.PKGINFO` entry
const MAX_PKGINFO_SIZE: u64 = 1024 * 1024;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Errors raised while reading package metadata
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Malformed package archive: {0}")]
    MalformedArchive(String),

    #[error("Unsupported package format: {0}")]
    UnsupportedFormat(String),

    #[error("Package filename '{actual}' does not match its metadata, expected '{expected}'")]
    FilenameMismatch { expected: String, actual: String },
}

/// Metadata of one package, as stored in its description record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub filename: String,
    pub name: String,
    pub base: Option<String>,
    pub version: String,
    pub description: Option<String>,
    pub groups: Vec<String>,
    pub compressed_size: u64,
    pub installed_size: u64,
    pub sha256: String,
    /// Base64 of the detached package signature
    pub pgp_signature: Option<String>,
    pub url: Option<String>,
    pub licenses: Vec<String>,
    pub arch: String,
    pub build_date: i64,
    pub packager: Option<String>,
    pub replaces: Vec<String>,
    pub conflicts: Vec<String>,
    pub provides: Vec<String>,
    pub depends: Vec<String>,
    pub opt_depends: Vec<String>,
    pub make_depends: Vec<String>,
    pub check_depends: Vec<String>,
    /// Distribution the package was pushed to
    pub distribution: String,
}

/// Read the metadata of a pushed package
///
/// `domain` is the registry's public name, used as the package URL when the
/// package does not declare one.
pub fn extract_metadata(
    filename: &str,
    distro: &str,
    domain: &str,
    data: &[u8],
) -> Result<PackageMetadata, MetadataError> {
    check_container(data)?;
    let pkginfo = read_pkginfo(data)?;

    let mut md = parse_pkginfo(&pkginfo)?;
    md.filename = filename.to_string();
    md.distribution = distro.to_string();
    md.compressed_size = data.len() as u64;
    md.sha256 = hex::encode(Sha256::digest(data));
    if md.url.is_none() && !domain.is_empty() {
        md.url = Some(domain.to_string());
    }

    let expected = package_filename(&md.name, &md.version, &md.arch);
    if filename != expected {
        return Err(MetadataError::FilenameMismatch {
            expected,
            actual: filename.to_string(),
        });
    }

    debug!(
        "Extracted metadata for {} {} ({})",
        md.name, md.version, md.arch
    );
    Ok(md)
}

fn check_container(data: &[u8]) -> Result<(), MetadataError> {
    let unsupported = |kind: &str| -> Result<(), MetadataError> {
        Err(MetadataError::UnsupportedFormat(kind.to_string()))
    };
    match data {
        [a, b, c, d, ..] if [*a, *b, *c, *d] == ZSTD_MAGIC => Ok(()),
        [0x1f, 0x8b, ..] => unsupported("gzip compressed archive, expected zstd"),
        [0xfd, b'7', b'z', b'X', b'Z', 0x00, ..] => {
            unsupported("xz compressed archive, expected zstd")
        }
        [b'B', b'Z', b'h', ..] => unsupported("bzip2 compressed archive, expected zstd"),
        _ if data.len() > 262 && &data[257..262] == b"ustar" => {
            unsupported("uncompressed tar archive, expected zstd")
        }
        _ => unsupported("not a zstd compressed tar archive"),
    }
}

/// Stream the archive until the `.PKGINFO` entry and return its contents
fn read_pkginfo(data: &[u8]) -> Result<String, MetadataError> {
    let malformed = |e: std::io::Error| MetadataError::MalformedArchive(e.to_string());

    let decoder = zstd::stream::read::Decoder::new(data).map_err(malformed)?;
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries().map_err(malformed)? {
        let entry = entry.map_err(malformed)?;

        let is_pkginfo = {
            let path = entry.path().map_err(malformed)?;
            let path = path.strip_prefix(".").unwrap_or(&path);
            path == Path::new(PKGINFO)
        };
        if !is_pkginfo {
            continue;
        }

        let size = entry.header().size().map_err(malformed)?;
        if size > MAX_PKGINFO_SIZE {
            return Err(MetadataError::MalformedArchive(format!(
                "{} is too large ({} bytes)",
                PKGINFO, size
            )));
        }

        let mut content = String::new();
        entry
            .take(MAX_PKGINFO_SIZE)
            .read_to_string(&mut content)
            .map_err(|e| {
                MetadataError::MalformedArchive(format!("unreadable {}: {}", PKGINFO, e))
            })?;
        return Ok(content);
    }

    Err(MetadataError::MalformedArchive(format!(
        "{} not found in package",
        PKGINFO
    )))
}

/// Parse the `key = value` lines of a `.PKGINFO` file
pub fn parse_pkginfo(text: &str) -> Result<PackageMetadata, MetadataError> {
    let mut md = PackageMetadata::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }

        match key.trim() {
            "pkgname" => md.name = value,
            "pkgbase" => md.base = Some(value),
            "pkgver" => md.version = value,
            "pkgdesc" => md.description = Some(value),
            "url" => md.url = Some(value),
            "packager" => md.packager = Some(value),
            "arch" => md.arch = value,
            "builddate" => {
                md.build_date = value.parse().map_err(|_| {
                    MetadataError::MalformedArchive(format!("invalid builddate '{}'", value))
                })?
            }
            "size" => {
                md.installed_size = value.parse().map_err(|_| {
                    MetadataError::MalformedArchive(format!("invalid size '{}'", value))
                })?
            }
            "group" => md.groups.push(value),
            "license" => md.licenses.push(value),
            "replaces" => md.replaces.push(value),
            "conflict" => md.conflicts.push(value),
            "provides" => md.provides.push(value),
            "depend" => md.depends.push(value),
            "optdepend" => md.opt_depends.push(value),
            "makedepend" => md.make_depends.push(value),
            "checkdepend" => md.check_depends.push(value),
            _ => {}
        }
    }

    for (field, value) in [
        ("pkgname", &md.name),
        ("pkgver", &md.version),
        ("arch", &md.arch),
    ] {
        if value.is_empty() {
            return Err(MetadataError::MalformedArchive(format!(
                "{} is missing {}",
                PKGINFO, field
            )));
        }
    }

    Ok(md)
}

impl PackageMetadata {
    /// Attach the detached signature pushed alongside the package
    pub fn with_signature(mut self, signature: &[u8]) -> Self {
        self.pgp_signature = Some(base64::engine::general_purpose::STANDARD.encode(signature));
        self
    }

    /// Directory name of this package inside a repository database
    pub fn db_entry_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Render the pacman `desc` block for this package
    ///
    /// Single-value fields are written as `%FIELD%\nvalue\n`; list fields end
    /// with an empty line, which is how libalpm detects the end of a list.
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        push_field(&mut out, "FILENAME", &self.filename);
        push_field(&mut out, "NAME", &self.name);
        push_field(&mut out, "BASE", self.base.as_deref().unwrap_or_default());
        push_field(&mut out, "VERSION", &self.version);
        push_field(
            &mut out,
            "DESC",
            self.description.as_deref().unwrap_or_default(),
        );
        push_list(&mut out, "GROUPS", &self.groups);
        push_number(&mut out, "CSIZE", self.compressed_size);
        push_number(&mut out, "ISIZE", self.installed_size);
        push_field(&mut out, "SHA256SUM", &self.sha256);
        push_field(
            &mut out,
            "PGPSIG",
            self.pgp_signature.as_deref().unwrap_or_default(),
        );
        push_field(&mut out, "URL", self.url.as_deref().unwrap_or_default());
        push_list(&mut out, "LICENSE", &self.licenses);
        push_field(&mut out, "ARCH", &self.arch);
        push_number(&mut out, "BUILDDATE", self.build_date);
        push_field(
            &mut out,
            "PACKAGER",
            self.packager.as_deref().unwrap_or_default(),
        );
        push_list(&mut out, "REPLACES", &self.replaces);
        push_list(&mut out, "CONFLICTS", &self.conflicts);
        push_list(&mut out, "PROVIDES", &self.provides);
        push_list(&mut out, "DEPENDS", &self.depends);
        push_list(&mut out, "OPTDEPENDS", &self.opt_depends);
        push_list(&mut out, "MAKEDEPENDS", &self.make_depends);
        push_list(&mut out, "CHECKDEPENDS", &self.check_depends);
        out
    }
}

fn push_field(out: &mut String, field: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    out.push('%');
    out.push_str(field);
    out.push_str("%\n");
    out.push_str(value);
    out.push('\n');
}

fn push_number<T: Display + Default + PartialEq>(out: &mut String, field: &str, value: T) {
    if value != T::default() {
        push_field(out, field, &value.to_string());
    }
}

fn push_list(out: &mut String, field: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    out.push('%');
    out.push_str(field);
    out.push_str("%\n");
    for value in values {
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
}

/// Identity fields read back from a rendered descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorFields {
    pub name: Option<String>,
    pub version: Option<String>,
    pub arch: Option<String>,
}

/// Read `%NAME%`, `%VERSION%` and `%ARCH%` from a descriptor block
pub fn parse_descriptor(text: &str) -> DescriptorFields {
    let mut fields = DescriptorFields::default();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let slot = match line.trim() {
            "%NAME%" => &mut fields.name,
            "%VERSION%" => &mut fields.version,
            "%ARCH%" => &mut fields.arch,
            _ => continue,
        };
        *slot = lines
            .next()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
    }

    fields
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::{build_archive, build_package, pkginfo};

    const DEMO_FILE: &str = "demo-1.0-x86_64.pkg.tar.zst";

    #[test]
    fn test_extract_demo_package() {
        let data = build_package(&pkginfo("demo", "1.0", "x86_64"));
        let md = extract_metadata(DEMO_FILE, "archlinux", "pkg.example.com", &data).unwrap();

        assert_eq!(md.name, "demo");
        assert_eq!(md.version, "1.0");
        assert_eq!(md.arch, "x86_64");
        assert_eq!(md.installed_size, 4096);
        assert_eq!(md.build_date, 1_700_000_000);
        assert_eq!(md.compressed_size, data.len() as u64);
        assert_eq!(md.sha256.len(), 64);
        assert_eq!(md.licenses, vec!["MIT".to_string()]);
        assert_eq!(md.depends, vec!["glibc".to_string()]);
        assert_eq!(md.distribution, "archlinux");
        assert_eq!(md.url.as_deref(), Some("pkg.example.com"));
        assert_eq!(md.db_entry_name(), "demo-1.0");
    }

    #[test]
    fn test_descriptor_layout() {
        let data = build_package(&pkginfo("demo", "1.0", "x86_64"));
        let md = extract_metadata(DEMO_FILE, "archlinux", "", &data).unwrap();
        let desc = md.descriptor();

        assert!(desc.starts_with("%FILENAME%\ndemo-1.0-x86_64.pkg.tar.zst\n"));
        assert!(desc.contains("%NAME%\ndemo\n%VERSION%\n1.0\n"));
        assert!(desc.contains("%LICENSE%\nMIT\n\n%ARCH%\nx86_64\n"));
        assert!(desc.ends_with("%DEPENDS%\nglibc\n\n"));
        assert!(!desc.contains("%URL%"));
        assert!(!desc.contains("%BASE%"));
        assert!(!desc.contains("%PGPSIG%"));

        let fields = parse_descriptor(&desc);
        assert_eq!(fields.name.as_deref(), Some("demo"));
        assert_eq!(fields.version.as_deref(), Some("1.0"));
        assert_eq!(fields.arch.as_deref(), Some("x86_64"));
    }

    #[test]
    fn test_sizes_render_without_truncation() {
        let info = "pkgname = big\npkgver = 1\narch = any\nsize = 18446744073709551615\n";
        let md = parse_pkginfo(info).unwrap();
        assert_eq!(md.installed_size, u64::MAX);

        let desc = PackageMetadata {
            compressed_size: u64::MAX - 1,
            ..md
        }
        .descriptor();
        assert!(desc.contains("%CSIZE%\n18446744073709551614\n"));
        assert!(desc.contains("%ISIZE%\n18446744073709551615\n"));
    }

    #[test]
    fn test_signature_is_rendered_after_checksum() {
        let data = build_package(&pkginfo("demo", "1.0", "x86_64"));
        let md = extract_metadata(DEMO_FILE, "archlinux", "", &data)
            .unwrap()
            .with_signature(&[0x88, 0x75, 0x04, 0x00]);

        let desc = md.descriptor();
        let expected = format!("%SHA256SUM%\n{}\n%PGPSIG%\niHUEAA==\n", md.sha256);
        assert!(desc.contains(&expected));
    }

    #[test]
    fn test_repeated_keys_accumulate() {
        let info = "pkgname = tool\npkgbase = tools\npkgver = 2.1-3\narch = any\n\
                    depend = a\ndepend = b>=2\noptdepend = c: extra feature\nprovides = tool-bin\n";
        let md = parse_pkginfo(info).unwrap();
        assert_eq!(md.base.as_deref(), Some("tools"));
        assert_eq!(md.depends, vec!["a".to_string(), "b>=2".to_string()]);
        assert_eq!(md.opt_depends, vec!["c: extra feature".to_string()]);

        let desc = PackageMetadata {
            filename: "tool-2.1-3-any.pkg.tar.zst".to_string(),
            ..md
        }
        .descriptor();
        assert!(desc.contains("%NAME%\ntool\n%BASE%\ntools\n%VERSION%\n2.1-3\n"));
        assert!(desc.contains("%DEPENDS%\na\nb>=2\n\n%OPTDEPENDS%\nc: extra feature\n\n"));
    }

    #[test]
    fn test_pkginfo_with_leading_dot_slash() {
        let info = pkginfo("demo", "1.0", "x86_64");
        let data = build_archive(&[("./.PKGINFO", info.as_bytes())]);
        let md = extract_metadata(DEMO_FILE, "archlinux", "", &data).unwrap();
        assert_eq!(md.name, "demo");
    }

    #[test]
    fn test_missing_pkginfo_is_malformed() {
        let data = build_archive(&[("usr/bin/demo", b"binary".as_slice())]);
        let err = extract_metadata(DEMO_FILE, "archlinux", "", &data).unwrap_err();
        assert!(matches!(err, MetadataError::MalformedArchive(_)));
    }

    #[test]
    fn test_missing_required_field_is_malformed() {
        let data = build_package("pkgname = demo\narch = x86_64\n");
        let err = extract_metadata(DEMO_FILE, "archlinux", "", &data).unwrap_err();
        assert!(matches!(err, MetadataError::MalformedArchive(msg) if msg.contains("pkgver")));
    }

    #[test]
    fn test_invalid_size_is_malformed() {
        let data = build_package("pkgname = demo\npkgver = 1.0\narch = x86_64\nsize = lots\n");
        let err = extract_metadata(DEMO_FILE, "archlinux", "", &data).unwrap_err();
        assert!(matches!(err, MetadataError::MalformedArchive(_)));
    }

    #[test]
    fn test_corrupt_zstd_stream_is_malformed() {
        let mut data = ZSTD_MAGIC.to_vec();
        data.extend_from_slice(&[0u8; 64]);
        let err = extract_metadata(DEMO_FILE, "archlinux", "", &data).unwrap_err();
        assert!(matches!(err, MetadataError::MalformedArchive(_)));
    }

    #[test]
    fn test_other_containers_are_unsupported() {
        let gzip = [0x1f, 0x8b, 0x08, 0x00, 0x00];
        assert!(matches!(
            extract_metadata(DEMO_FILE, "archlinux", "", &gzip),
            Err(MetadataError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            extract_metadata(DEMO_FILE, "archlinux", "", b"plain text"),
            Err(MetadataError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            extract_metadata(DEMO_FILE, "archlinux", "", &[]),
            Err(MetadataError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_filename_must_match_metadata() {
        let data = build_package(&pkginfo("demo", "1.0", "x86_64"));
        let err = extract_metadata("demo-2.0-x86_64.pkg.tar.zst", "archlinux", "", &data)
            .unwrap_err();
        match err {
            MetadataError::FilenameMismatch { expected, actual } => {
                assert_eq!(expected, DEMO_FILE);
                assert_eq!(actual, "demo-2.0-x86_64.pkg.tar.zst");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
