//! Persistent content store backed by redb

use super::{public_key_id, ContentStore, StorageError};
use crate::core::signature::parse_public_keys;
use ::redb::{Database, ReadableTable, TableDefinition};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Package records keyed by composite store key
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Armored public keys keyed by `{owner}/{email}`
const PUBLIC_KEYS: TableDefinition<&str, &str> = TableDefinition::new("public_keys");

/// Content store on an embedded redb database
///
/// redb admits one write transaction at a time; every batch is applied inside
/// a single write transaction, which is the store's write lock.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").field("path", &self.path).finish()
    }
}

impl RedbStore {
    /// Open (or create) the database file at `path`
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(path).map_err(::redb::Error::from)?;

        // Read transactions fail on tables that were never created.
        let txn = db.begin_write().map_err(::redb::Error::from)?;
        txn.open_table(RECORDS).map_err(::redb::Error::from)?;
        txn.open_table(PUBLIC_KEYS).map_err(::redb::Error::from)?;
        txn.commit().map_err(::redb::Error::from)?;

        info!("Opened package store at {}", path.display());

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Import every `<dir>/<owner>/<email>` key file into the store
    ///
    /// Each file must hold armored public keys; the first unreadable key
    /// aborts the import. Returns the number of imported keys.
    pub async fn import_public_keys(&self, dir: &Path) -> Result<usize, StorageError> {
        let entries = discover_key_files(dir)?;
        let count = entries.len();

        let db = self.db.clone();
        run_blocking(move || -> Result<(), ::redb::Error> {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(PUBLIC_KEYS)?;
                for entry in &entries {
                    table.insert(
                        public_key_id(&entry.owner, &entry.email).as_str(),
                        entry.armored.as_str(),
                    )?;
                }
            }
            txn.commit()?;
            Ok(())
        })
        .await?;

        info!("Imported {} public keys from {}", count, dir.display());
        Ok(count)
    }
}

/// A validated key file found in the key directory
#[derive(Debug, Clone)]
pub struct KeyFile {
    pub owner: String,
    pub email: String,
    pub armored: String,
}

/// Read and validate the `<dir>/<owner>/<email>` key layout
pub fn discover_key_files(dir: &Path) -> Result<Vec<KeyFile>, StorageError> {
    let mut found = Vec::new();

    for owner_entry in std::fs::read_dir(dir)? {
        let owner_entry = owner_entry?;
        if !owner_entry.file_type()?.is_dir() {
            continue;
        }
        let owner = owner_entry.file_name().to_string_lossy().into_owned();

        for key_entry in std::fs::read_dir(owner_entry.path())? {
            let key_entry = key_entry?;
            if !key_entry.file_type()?.is_file() {
                continue;
            }
            let email = key_entry.file_name().to_string_lossy().into_owned();
            let path = key_entry.path();
            let armored = std::fs::read_to_string(&path)?;

            parse_public_keys(&armored).map_err(|e| StorageError::InvalidKey {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

            debug!("Found public key for {}/{}", owner, email);
            found.push(KeyFile {
                owner: owner.clone(),
                email,
                armored,
            });
        }
    }

    found.sort_by(|a, b| (&a.owner, &a.email).cmp(&(&b.owner, &b.email)));
    Ok(found)
}

async fn run_blocking<T, F>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, ::redb::Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
        .map_err(StorageError::from)
}

#[async_trait]
impl ContentStore for RedbStore {
    async fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.save_all(&[(key, data)]).await
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let db = self.db.clone();
        let owned_key = key.to_string();
        let value = run_blocking(move || -> Result<Option<Vec<u8>>, ::redb::Error> {
            let txn = db.begin_read()?;
            let table = txn.open_table(RECORDS)?;
            let value = table.get(owned_key.as_str())?.map(|v| v.value().to_vec());
            Ok(value)
        })
        .await?;

        value.ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_all(&[key]).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let db = self.db.clone();
        run_blocking(move || -> Result<Vec<String>, ::redb::Error> {
            let txn = db.begin_read()?;
            let table = txn.open_table(RECORDS)?;
            let mut keys = Vec::new();
            for item in table.iter()? {
                let (key, _) = item?;
                keys.push(key.value().to_string());
            }
            Ok(keys)
        })
        .await
    }

    async fn public_key(&self, owner: &str, email: &str) -> Result<String, StorageError> {
        let db = self.db.clone();
        let id = public_key_id(owner, email);
        let lookup = id.clone();
        let value = run_blocking(move || -> Result<Option<String>, ::redb::Error> {
            let txn = db.begin_read()?;
            let table = txn.open_table(PUBLIC_KEYS)?;
            let value = table.get(lookup.as_str())?.map(|v| v.value().to_string());
            Ok(value)
        })
        .await?;

        value.ok_or(StorageError::NotFound(id))
    }

    async fn save_all(&self, records: &[(&str, &[u8])]) -> Result<(), StorageError> {
        let db = self.db.clone();
        let owned: Vec<(String, Vec<u8>)> = records
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect();
        run_blocking(move || -> Result<(), ::redb::Error> {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(RECORDS)?;
                for (key, value) in &owned {
                    table.insert(key.as_str(), value.as_slice())?;
                }
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn remove_all(&self, keys: &[&str]) -> Result<(), StorageError> {
        let db = self.db.clone();
        let owned: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        run_blocking(move || -> Result<(), ::redb::Error> {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(RECORDS)?;
                for key in &owned {
                    table.remove(key.as_str())?;
                }
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::{public_key_armor, signing_key};
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> RedbStore {
        RedbStore::open(&dir.path().join("db").join("registry.redb")).unwrap()
    }

    #[tokio::test]
    async fn test_save_load_remove() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.save("archlinux/alice/a.pkg.tar.zst", b"payload").await.unwrap();
        assert_eq!(
            store.load("archlinux/alice/a.pkg.tar.zst").await.unwrap(),
            b"payload"
        );

        store.remove("archlinux/alice/a.pkg.tar.zst").await.unwrap();
        let err = store.load("archlinux/alice/a.pkg.tar.zst").await.unwrap_err();
        assert!(err.is_not_found());

        // Removing an absent key is not an error
        store.remove("archlinux/alice/a.pkg.tar.zst").await.unwrap();
    }

    #[tokio::test]
    async fn test_save_all_overwrites_and_lists_keys() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .save_all(&[("k1", b"one".as_slice()), ("k2", b"two".as_slice())])
            .await
            .unwrap();
        store.save("k1", b"uno").await.unwrap();

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["k1".to_string(), "k2".to_string()]);
        assert_eq!(store.load("k1").await.unwrap(), b"uno");

        store.remove_all(&["k2", "missing", "k1"]).await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            store.save("k", b"v").await.unwrap();
        }
        let store = open_store(&dir);
        assert_eq!(store.load("k").await.unwrap(), b"v");
    }

    #[tokio::test]
    async fn test_import_public_keys() {
        let dir = TempDir::new().unwrap();
        let key_dir = dir.path().join("keys");
        std::fs::create_dir_all(key_dir.join("alice")).unwrap();
        std::fs::create_dir_all(key_dir.join("bob")).unwrap();
        let alice_armor = public_key_armor(&signing_key(1));
        std::fs::write(key_dir.join("alice").join("alice@example.com"), &alice_armor).unwrap();
        std::fs::write(
            key_dir.join("bob").join("bob@example.com"),
            public_key_armor(&signing_key(2)),
        )
        .unwrap();
        // Stray files at the top level are ignored
        std::fs::write(key_dir.join("README"), "not a key").unwrap();

        let store = open_store(&dir);
        let imported = store.import_public_keys(&key_dir).await.unwrap();
        assert_eq!(imported, 2);

        let key = store.public_key("alice", "alice@example.com").await.unwrap();
        assert_eq!(key, alice_armor);
        assert!(store
            .public_key("alice", "bob@example.com")
            .await
            .unwrap_err()
            .is_not_found());

        // Key material is kept out of the record listing
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_gpg_exported_key() {
        let dir = TempDir::new().unwrap();
        let key_dir = dir.path().join("keys");
        std::fs::create_dir_all(key_dir.join("alice")).unwrap();
        let exported = include_str!("../../tests/fixtures/gpg/alice.asc");
        std::fs::write(key_dir.join("alice").join("alice@example.com"), exported).unwrap();

        let store = open_store(&dir);
        assert_eq!(store.import_public_keys(&key_dir).await.unwrap(), 1);
        assert_eq!(
            store.public_key("alice", "alice@example.com").await.unwrap(),
            exported
        );
    }

    #[tokio::test]
    async fn test_import_rejects_corrupt_key_file() {
        let dir = TempDir::new().unwrap();
        let key_dir = dir.path().join("keys");
        std::fs::create_dir_all(key_dir.join("mallory")).unwrap();
        std::fs::write(key_dir.join("mallory").join("m@example.com"), "garbage").unwrap();

        let store = open_store(&dir);
        let err = store.import_public_keys(&key_dir).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
    }
}
