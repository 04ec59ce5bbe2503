//! Credential token and its persistence.
//!
//! The session store never cares where the token lives; it only needs
//! `load`/`save`/`clear`. Two backends ship with the crate:
//!
//! - [`MemoryCredentialStore`] — process lifetime only (tests, embedding).
//! - [`FileCredentialStore`] — survives restarts; default location
//!   `~/.cache/threatsync/credential`, written atomically with 0600
//!   permissions on unix.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::{Result, SyncError};

/// Opaque bearer token.
///
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Persistence for the credential token.
pub trait CredentialStore: Send + Sync {
    /// Read the persisted credential, if any.
    fn load(&self) -> Result<Option<Credential>>;

    /// Persist `credential`, replacing any previous one.
    fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove the persisted credential. Clearing an empty store is not an
    /// error.
    fn clear(&self) -> Result<()>;
}

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a credential, as if persisted by an earlier run.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            token: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// File-backed credential store.
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
}

impl Default for FileCredentialStore {
    fn default() -> Self {
        Self::new(default_credential_path())
    }
}

/// Default credential path: `~/.cache/threatsync/credential`.
pub fn default_credential_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("threatsync")
        .join("credential")
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SyncError::Storage(format!(
                    "failed to read credential {}: {e}",
                    self.path.display()
                )));
            }
        };
        let token = content.trim();
        if token.is_empty() {
            warn!(path = %self.path.display(), "ignoring empty credential file");
            return Ok(None);
        }
        Ok(Some(Credential::new(token)))
    }

    /// Atomic write via tmp + rename.
    fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::Storage(format!(
                    "failed to create credential dir {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, credential.expose()).map_err(|e| {
            SyncError::Storage(format!(
                "failed to write credential file {}: {e}",
                tmp_path.display()
            ))
        })?;
        restrict_permissions(&tmp_path)?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            SyncError::Storage(format!(
                "failed to rename credential file {} → {}: {e}",
                tmp_path.display(),
                self.path.display()
            ))
        })?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::Storage(format!(
                "failed to remove credential {}: {e}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|e| {
        SyncError::Storage(format!(
            "failed to set permissions on {}: {e}",
            path.display()
        ))
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let credential = Credential::new("secret-token");
        assert_eq!(format!("{credential:?}"), "Credential(***)");
        assert_eq!(credential.expose(), "secret-token");
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&Credential::new("abc")).unwrap();
        assert_eq!(store.load().unwrap(), Some(Credential::new("abc")));
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested").join("credential"));
        assert!(store.load().unwrap().is_none());

        store.save(&Credential::new("tok-1")).unwrap();
        assert_eq!(store.load().unwrap(), Some(Credential::new("tok-1")));

        store.save(&Credential::new("tok-2")).unwrap();
        assert_eq!(store.load().unwrap(), Some(Credential::new("tok-2")));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn file_store_clear_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credential"));
        assert!(store.clear().is_ok());
    }

    #[test]
    fn file_store_ignores_blank_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential");
        std::fs::write(&path, "  \n").unwrap();
        assert!(FileCredentialStore::new(&path).load().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credential"));
        store.save(&Credential::new("tok")).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn default_path_ends_with_credential() {
        assert!(default_credential_path().ends_with("threatsync/credential"));
    }
}
