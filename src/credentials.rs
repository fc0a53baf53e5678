//! Durable credential storage.
//!
//! The gateway host and API key live in one small TOML file under two fixed
//! keys, `waha_host` and `waha_token`. Both are written together and cleared
//! together (the file is removed), so a half-written pair is never observed.
//! No validation happens here; the login probe and [`crate::auth`] own that.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CredentialError;

/// Host + API key pair for one gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Absolute http(s) URL without trailing slash.
    pub host: String,
    pub api_key: String,
}

impl Credentials {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_key: api_key.into(),
        }
    }

    /// Both values present.
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && !self.api_key.is_empty()
    }
}

/// On-disk layout.
#[derive(Serialize, Deserialize, Default)]
struct StoredCredentials {
    #[serde(default)]
    waha_host: String,
    #[serde(default)]
    waha_token: String,
}

/// File-backed credential store.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored pair. `None` when nothing (or only half a pair) is stored.
    pub fn load(&self) -> Result<Option<Credentials>, CredentialError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredCredentials = toml::from_str(&content)?;
        let creds = Credentials::new(stored.waha_host, stored.waha_token);
        Ok(creds.is_complete().then_some(creds))
    }

    /// Persist both values, replacing whatever was stored.
    ///
    /// Writes to a sibling temp file and renames it over the target.
    pub fn save(&self, host: &str, api_key: &str) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let body = toml::to_string(&StoredCredentials {
            waha_host: host.to_string(),
            waha_token: api_key.to_string(),
        })?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "credentials saved");
        Ok(())
    }

    /// Remove both values. Clearing an empty store is not an error.
    pub fn clear(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "credentials cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("nested").join("credentials.toml"))
    }

    #[test]
    fn empty_store_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&dir).load().unwrap(), None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save("https://gw.example.com", "secret").unwrap();
        assert_eq!(
            store.load().unwrap(),
            Some(Credentials::new("https://gw.example.com", "secret"))
        );
    }

    #[test]
    fn uses_fixed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save("http://h", "k").unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("waha_host = \"http://h\""));
        assert!(raw.contains("waha_token = \"k\""));
    }

    #[test]
    fn clear_removes_both_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save("http://h", "k").unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn half_pair_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "waha_host = \"http://h\"\n").unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.toml"));
        std::fs::write(store.path(), "waha_host = [").unwrap();
        assert!(matches!(store.load(), Err(CredentialError::Parse(_))));
    }
}
