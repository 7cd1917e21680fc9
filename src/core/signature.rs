//! Detached OpenPGP signature verification against owner public keys
//!
//! Owners register the ASCII-armored keyring printed by
//! `gpg --armor --export`. Signatures are OpenPGP detached signatures, binary
//! as written by `makepkg --sign` or armored as written by
//! `gpg --armor --detach-sign`. A signature made by any primary key or subkey
//! in the keyring is accepted.

use crate::storage::{ContentStore, StorageError};
use pgp::{Deserializable, SignedPublicKey, StandaloneSignature};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Signature authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No public key registered for {owner} <{email}>")]
    UnknownIdentity { owner: String, email: String },

    #[error("Unable to read public key: {0}")]
    CorruptKey(String),

    #[error("Signature does not match any key of {owner} <{email}>")]
    SignatureMismatch { owner: String, email: String },

    #[error(transparent)]
    Storage(StorageError),
}

/// Parse every public key in an armored keyring
pub fn parse_public_keys(armored: &str) -> Result<Vec<SignedPublicKey>, AuthError> {
    let (keys, _headers) = SignedPublicKey::from_armor_many(Cursor::new(armored.as_bytes()))
        .map_err(|e| AuthError::CorruptKey(e.to_string()))?;

    let keys = keys
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AuthError::CorruptKey(e.to_string()))?;

    if keys.is_empty() {
        return Err(AuthError::CorruptKey(
            "keyring holds no public key".to_string(),
        ));
    }
    Ok(keys)
}

/// Parse a detached signature, binary or armored
fn parse_signature(signature: &[u8]) -> Option<StandaloneSignature> {
    StandaloneSignature::from_reader_single(Cursor::new(signature))
        .map(|(signature, _headers)| signature)
        .ok()
}

fn signed_by(keys: &[SignedPublicKey], signature: &StandaloneSignature, data: &[u8]) -> bool {
    keys.iter().any(|key| {
        signature.verify(key, data).is_ok()
            || key
                .public_subkeys
                .iter()
                .any(|subkey| signature.verify(subkey, data).is_ok())
    })
}

/// Verifies detached signatures with keys resolved from the content store
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn ContentStore>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Check that `signature` over `data` was made by a key of `owner`/`email`
    pub async fn verify(
        &self,
        data: &[u8],
        signature: &[u8],
        owner: &str,
        email: &str,
    ) -> Result<(), AuthError> {
        let armored = self
            .store
            .public_key(owner, email)
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => AuthError::UnknownIdentity {
                    owner: owner.to_string(),
                    email: email.to_string(),
                },
                other => AuthError::Storage(other),
            })?;

        let keys = parse_public_keys(&armored)?;

        let mismatch = || AuthError::SignatureMismatch {
            owner: owner.to_string(),
            email: email.to_string(),
        };

        let signature = parse_signature(signature).ok_or_else(mismatch)?;

        if signed_by(&keys, &signature, data) {
            debug!("Signature verified for {} <{}>", owner, email);
            Ok(())
        } else {
            Err(mismatch())
        }
    }
}
