//! Test utilities shared across the crate
//!
//! Helpers for building package archives and signing requests, used by unit
//! tests in src/ and, through the `test-utils` feature, by the integration
//! tests in tests/.
#![allow(clippy::panic)]

use chrono::{DateTime, Utc};
use pgp::crypto::hash::HashAlgorithm;
use pgp::packet::{self, SignatureConfig, SignatureType, Subpacket, SubpacketData};
use pgp::types::{PublicKeyTrait, SecretKeyTrait};
use pgp::{KeyType, SecretKeyParamsBuilder, SignedPublicKey, SignedSecretKey};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Key creation time of every generated key, so a seed always yields the same fingerprint
const KEY_CREATED_AT: i64 = 1_700_000_000;

/// Deterministic OpenPGP signing key derived from a single seed byte
pub fn signing_key(seed: u8) -> SignedSecretKey {
    let mut rng = StdRng::seed_from_u64(u64::from(seed));
    let created_at = DateTime::<Utc>::from_timestamp(KEY_CREATED_AT, 0).unwrap_or_default();

    let mut params = SecretKeyParamsBuilder::default();
    params
        .key_type(KeyType::EdDSALegacy)
        .can_certify(true)
        .can_sign(true)
        .primary_user_id(format!("Tester {seed} <tester{seed}@example.com>"))
        .created_at(created_at);
    let params = match params.build() {
        Ok(params) => params,
        Err(e) => panic!("invalid key parameters: {e}"),
    };
    let key = match params.generate(&mut rng) {
        Ok(key) => key,
        Err(e) => panic!("failed to generate key: {e}"),
    };
    match key.sign(&mut rng, String::new) {
        Ok(key) => key,
        Err(e) => panic!("failed to self-sign key: {e}"),
    }
}

/// Armored public key for `key`, as printed by `gpg --armor --export`
pub fn public_key_armor(key: &SignedSecretKey) -> String {
    public_keyring_armor(&[key])
}

/// Armored keyring holding the public halves of `keys`
pub fn public_keyring_armor(keys: &[&SignedSecretKey]) -> String {
    let mut rng = StdRng::seed_from_u64(0);
    let public: Vec<SignedPublicKey> = keys
        .iter()
        .map(|key| match key.public_key().sign(&mut rng, *key, String::new) {
            Ok(public) => public,
            Err(e) => panic!("failed to sign public key: {e}"),
        })
        .collect();

    let mut armored = Vec::new();
    if let Err(e) = pgp::armor::write(
        &public,
        pgp::armor::BlockType::PublicKey,
        &mut armored,
        None,
        true,
    ) {
        panic!("failed to armor keyring: {e}");
    }
    match String::from_utf8(armored) {
        Ok(armored) => armored,
        Err(e) => panic!("armored keyring is not UTF-8: {e}"),
    }
}

/// Binary detached signature over `data`, as written by `makepkg --sign`
pub fn sign(key: &SignedSecretKey, data: &[u8]) -> Vec<u8> {
    let mut config = SignatureConfig::v4(SignatureType::Binary, key.algorithm(), HashAlgorithm::SHA2_256);
    config.hashed_subpackets = vec![
        Subpacket::regular(SubpacketData::SignatureCreationTime(Utc::now())),
        Subpacket::regular(SubpacketData::IssuerFingerprint(key.fingerprint())),
    ];
    config.unhashed_subpackets = vec![Subpacket::regular(SubpacketData::Issuer(key.key_id()))];

    let signature = match config.sign(key, String::new, data) {
        Ok(signature) => signature,
        Err(e) => panic!("failed to sign: {e}"),
    };
    let mut out = Vec::new();
    if let Err(e) = packet::write_packet(&mut out, &signature) {
        panic!("failed to serialize signature: {e}");
    }
    out
}

/// Minimal `.PKGINFO` for a package
pub fn pkginfo(name: &str, version: &str, arch: &str) -> String {
    format!(
        "# Generated by makepkg 6.0.2\n\
         pkgname = {name}\n\
         pkgver = {version}\n\
         pkgdesc = Test package {name}\n\
         builddate = 1700000000\n\
         packager = Test Packager <test@example.com>\n\
         size = 4096\n\
         arch = {arch}\n\
         license = MIT\n\
         depend = glibc\n"
    )
}

/// Build a zstd-compressed package archive holding `.PKGINFO` and one payload file
pub fn build_package(pkginfo: &str) -> Vec<u8> {
    build_archive(&[(".PKGINFO", pkginfo.as_bytes()), ("usr/bin/demo", b"#!/bin/sh\n")])
}

/// Build a zstd-compressed tar archive from `(path, contents)` pairs
pub fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(1_700_000_000);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        if let Err(e) = builder.append_data(&mut header, path, *contents) {
            panic!("failed to append {path}: {e}");
        }
    }
    let tar_bytes = match builder.into_inner() {
        Ok(bytes) => bytes,
        Err(e) => panic!("failed to finish tar archive: {e}"),
    };
    match zstd::stream::encode_all(tar_bytes.as_slice(), 3) {
        Ok(bytes) => bytes,
        Err(e) => panic!("failed to compress archive: {e}"),
    }
}
