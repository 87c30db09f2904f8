// store.rs — Credential storage backends.
//
// Two backends behind one trait:
//   MemoryStore    — MemoryOnly mode. Credentials live in a process-local
//                    map and vanish on termination. Nothing here can write
//                    to durable storage: there is no file handle to write to.
//   DirectoryStore — Persisted mode (opt-in, higher risk). One JSON file
//                    per account under a restricted directory, written
//                    atomically (temp file + rename) with 0600 permissions.
//
// The file-per-account layout and delete-is-idempotent semantics follow the
// credential store this design descends from.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::credential::Credential;

/// Process-wide credential retention policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Tokens live only in process memory. Default.
    MemoryOnly,
    /// Tokens are written to a restricted directory and survive restarts.
    Persisted,
}

/// Errors from credential storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed credential file {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Account ids become file names in the directory store; path
    /// separators and traversal sequences are refused outright.
    #[error("account id '{account_id}' is not a valid store key")]
    InvalidAccountId { account_id: String },
}

/// Storage backend for credentials, keyed by account id.
pub trait CredentialStore: Send + Sync {
    fn get(&self, account_id: &str) -> Result<Option<Credential>, StoreError>;
    fn put(&self, credential: &Credential) -> Result<(), StoreError>;
    /// Idempotent: deleting an absent credential succeeds.
    fn delete(&self, account_id: &str) -> Result<(), StoreError>;
    fn list_accounts(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory store for MemoryOnly mode.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<HashMap<String, Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, HashMap<String, Credential>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, account_id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.guard().get(account_id).cloned())
    }

    fn put(&self, credential: &Credential) -> Result<(), StoreError> {
        self.guard()
            .insert(credential.account_id.clone(), credential.clone());
        Ok(())
    }

    fn delete(&self, account_id: &str) -> Result<(), StoreError> {
        self.guard().remove(account_id);
        Ok(())
    }

    fn list_accounts(&self) -> Result<Vec<String>, StoreError> {
        let mut accounts: Vec<String> = self.guard().keys().cloned().collect();
        accounts.sort();
        Ok(accounts)
    }
}

/// File-per-account JSON store for Persisted mode.
pub struct DirectoryStore {
    base_dir: PathBuf,
}

impl DirectoryStore {
    /// Open (or create) the store directory. On Unix the directory is
    /// created with 0700 permissions.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).map_err(|source| StoreError::Io {
                path: base_dir.clone(),
                source,
            })?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&base_dir, fs::Permissions::from_mode(0o700)).map_err(
                    |source| StoreError::Io {
                        path: base_dir.clone(),
                        source,
                    },
                )?;
            }
            info!(dir = %base_dir.display(), "created credential directory");
        }
        Ok(Self { base_dir })
    }

    fn credential_path(&self, account_id: &str) -> Result<PathBuf, StoreError> {
        if account_id.is_empty()
            || account_id.contains('/')
            || account_id.contains('\\')
            || account_id.contains("..")
        {
            return Err(StoreError::InvalidAccountId {
                account_id: account_id.to_string(),
            });
        }
        Ok(self.base_dir.join(format!("{account_id}.json")))
    }
}

impl CredentialStore for DirectoryStore {
    fn get(&self, account_id: &str) -> Result<Option<Credential>, StoreError> {
        let path = self.credential_path(account_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let credential =
            serde_json::from_str(&text).map_err(|source| StoreError::Malformed { path, source })?;
        Ok(Some(credential))
    }

    fn put(&self, credential: &Credential) -> Result<(), StoreError> {
        let path = self.credential_path(&credential.account_id)?;
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(credential).map_err(|source| {
            StoreError::Malformed {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600)).map_err(|source| {
                StoreError::Io {
                    path: tmp.clone(),
                    source,
                }
            })?;
        }
        // Atomic replace — readers never observe a partial file.
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(account_id = %credential.account_id, "persisted credential");
        Ok(())
    }

    fn delete(&self, account_id: &str) -> Result<(), StoreError> {
        let path = self.credential_path(account_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(account_id, "deleted persisted credential");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn list_accounts(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.base_dir).map_err(|source| StoreError::Io {
            path: self.base_dir.clone(),
            source,
        })?;
        let mut accounts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.base_dir.clone(),
                source,
            })?;
            let name = entry.file_name();
            if let Some(name) = name.to_str() {
                if let Some(account) = name.strip_suffix(".json") {
                    accounts.push(account.to_string());
                }
            }
        }
        accounts.sort();
        Ok(accounts)
    }
}

/// Build the store matching a storage mode.
pub fn open_store(
    mode: StorageMode,
    credentials_dir: Option<&Path>,
) -> Result<Box<dyn CredentialStore>, StoreError> {
    match mode {
        StorageMode::MemoryOnly => Ok(Box::new(MemoryStore::new())),
        StorageMode::Persisted => {
            let dir = credentials_dir.unwrap_or_else(|| Path::new(".credentials"));
            Ok(Box::new(DirectoryStore::open(dir)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn credential(account_id: &str) -> Credential {
        Credential {
            account_id: account_id.to_string(),
            scopes: BTreeSet::from(["drive.readonly".to_string()]),
            access_token: "at-test".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            refresh_token: Some("rt-test".to_string()),
        }
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        store.put(&credential("alice@example.com")).unwrap();

        let loaded = store.get("alice@example.com").unwrap().unwrap();
        assert_eq!(loaded.access_token, "at-test");

        store.delete("alice@example.com").unwrap();
        assert!(store.get("alice@example.com").unwrap().is_none());
        // Idempotent delete.
        store.delete("alice@example.com").unwrap();
    }

    #[test]
    fn directory_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path().join("creds")).unwrap();

        store.put(&credential("alice@example.com")).unwrap();
        store.put(&credential("bob@example.com")).unwrap();

        let loaded = store.get("alice@example.com").unwrap().unwrap();
        assert_eq!(loaded.refresh_token.as_deref(), Some("rt-test"));

        assert_eq!(
            store.list_accounts().unwrap(),
            vec!["alice@example.com", "bob@example.com"]
        );

        store.delete("alice@example.com").unwrap();
        assert!(store.get("alice@example.com").unwrap().is_none());
        assert_eq!(store.list_accounts().unwrap(), vec!["bob@example.com"]);
    }

    #[test]
    fn directory_store_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();

        for bad in ["../escape", "a/b", "a\\b", ""] {
            match store.get(bad) {
                Err(StoreError::InvalidAccountId { .. }) => {}
                other => panic!("expected InvalidAccountId for {bad:?}, got {other:?}"),
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn directory_store_restricts_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path().join("creds")).unwrap();
        store.put(&credential("alice@example.com")).unwrap();

        let path = dir.path().join("creds").join("alice@example.com.json");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn memory_store_lists_sorted_accounts() {
        let store = MemoryStore::new();
        store.put(&credential("b@example.com")).unwrap();
        store.put(&credential("a@example.com")).unwrap();
        assert_eq!(
            store.list_accounts().unwrap(),
            vec!["a@example.com", "b@example.com"]
        );
    }
}
