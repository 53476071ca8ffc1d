//! Durable client-side credential storage.
//!
//! Exactly two keys are ever stored: the bearer token and the account email.
//! They are written together at login, the token alone on refresh, and always
//! cleared together.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::DeepchatError;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const USER_EMAIL_KEY: &str = "user_email";

/// Raw stored values. Either may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCredentials {
    pub access_token: Option<String>,
    pub user_email: Option<String>,
}

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<StoredCredentials, DeepchatError>;

    /// Persist both keys.
    fn save(&self, access_token: &str, user_email: &str) -> Result<(), DeepchatError>;

    /// Replace the token, keeping the stored email.
    fn save_token(&self, access_token: &str) -> Result<(), DeepchatError>;

    /// Remove both keys. Succeeds when nothing is stored.
    fn clear(&self) -> Result<(), DeepchatError>;
}

// ============================================================================
// FileCredentialStore
// ============================================================================

/// JSON file holding `{"access_token": ..., "user_email": ...}`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, DeepchatError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), DeepchatError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let mut file = owner_only(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(map)?)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Open `path` for writing, readable by the owner only.
#[cfg(unix)]
fn owner_only(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // A leftover temp file keeps its old mode; tighten it.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn owner_only(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<StoredCredentials, DeepchatError> {
        let mut map = self.read_map()?;
        Ok(StoredCredentials {
            access_token: map.remove(ACCESS_TOKEN_KEY),
            user_email: map.remove(USER_EMAIL_KEY),
        })
    }

    fn save(&self, access_token: &str, user_email: &str) -> Result<(), DeepchatError> {
        let mut map = BTreeMap::new();
        map.insert(ACCESS_TOKEN_KEY.to_string(), access_token.to_string());
        map.insert(USER_EMAIL_KEY.to_string(), user_email.to_string());
        self.write_map(&map)
    }

    fn save_token(&self, access_token: &str) -> Result<(), DeepchatError> {
        let mut map = self.read_map()?;
        map.insert(ACCESS_TOKEN_KEY.to_string(), access_token.to_string());
        self.write_map(&map)
    }

    fn clear(&self) -> Result<(), DeepchatError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// MemoryCredentialStore
// ============================================================================

/// In-process store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<StoredCredentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(access_token: &str, user_email: &str) -> Self {
        Self {
            inner: Mutex::new(StoredCredentials {
                access_token: Some(access_token.to_string()),
                user_email: Some(user_email.to_string()),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoredCredentials> {
        // A poisoned lock still holds plain strings; keep using them.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<StoredCredentials, DeepchatError> {
        Ok(self.lock().clone())
    }

    fn save(&self, access_token: &str, user_email: &str) -> Result<(), DeepchatError> {
        *self.lock() = StoredCredentials {
            access_token: Some(access_token.to_string()),
            user_email: Some(user_email.to_string()),
        };
        Ok(())
    }

    fn save_token(&self, access_token: &str) -> Result<(), DeepchatError> {
        self.lock().access_token = Some(access_token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), DeepchatError> {
        *self.lock() = StoredCredentials::default();
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FileCredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested/credentials.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load().unwrap(), StoredCredentials::default());
    }

    #[test]
    fn test_save_writes_both_fixed_keys() {
        let (_dir, store) = temp_store();
        store.save("tok-1", "ana@example.com").unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json[ACCESS_TOKEN_KEY], "tok-1");
        assert_eq!(json[USER_EMAIL_KEY], "ana@example.com");
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_credentials_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = temp_store();
        store.save("secret-token", "ana@example.com").unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "credentials mode was {:o}", mode & 0o777);

        store.save_token("secret-token-2").unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_save_token_keeps_email() {
        let (_dir, store) = temp_store();
        store.save("tok-1", "ana@example.com").unwrap();
        store.save_token("tok-2").unwrap();

        let creds = store.load().unwrap();
        assert_eq!(creds.access_token.as_deref(), Some("tok-2"));
        assert_eq!(creds.user_email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_clear_removes_both_and_is_idempotent() {
        let (_dir, store) = temp_store();
        store.save("tok-1", "ana@example.com").unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        assert_eq!(store.load().unwrap(), StoredCredentials::default());

        // Clearing an empty store is not an error.
        store.clear().unwrap();
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryCredentialStore::with_credentials("t", "e@example.com");
        store.save_token("t2").unwrap();
        assert_eq!(store.load().unwrap().access_token.as_deref(), Some("t2"));
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), StoredCredentials::default());
    }
}
