use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const USER_UUID_KEY: &str = "user_uuid";

/// Persisted client identity, kept in a small key/value JSON file.
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self> {
        Ok(Self::open(crate::config::data_dir()?.join("storage.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored identity, generating and persisting one on first use.
    pub fn get_or_create_identity(&self) -> Result<String> {
        let mut entries = self.read_entries()?;
        if let Some(existing) = entries.get(USER_UUID_KEY).filter(|id| !id.is_empty()) {
            return Ok(existing.clone());
        }

        let identity = Uuid::new_v4().to_string();
        entries.insert(USER_UUID_KEY.to_string(), identity.clone());
        self.write_entries(&entries)?;
        tracing::info!(path = %self.path.display(), "generated new client identity");
        Ok(identity)
    }

    pub fn clear(&self) -> Result<()> {
        let mut entries = self.read_entries()?;
        if entries.remove(USER_UUID_KEY).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).with_context(|| format!("parsing {}", self.path.display()))
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content).with_context(|| format!("writing {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> IdentityStore {
        IdentityStore::open(dir.path().join("nested").join("storage.json"))
    }

    #[test]
    fn test_identity_is_stable_across_calls() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let first = store.get_or_create_identity().unwrap();
        let second = store.get_or_create_identity().unwrap();
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn test_identity_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let first = store_in(&dir).get_or_create_identity().unwrap();
        let reopened = store_in(&dir).get_or_create_identity().unwrap();
        assert_eq!(first, reopened);
    }

    #[test]
    fn test_clear_yields_new_identity() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let first = store.get_or_create_identity().unwrap();
        store.clear().unwrap();
        let second = store.get_or_create_identity().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_clear_without_storage_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_other_keys_are_preserved() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), r#"{"theme":"dark"}"#).unwrap();

        store.get_or_create_identity().unwrap();
        store.clear().unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        let entries: BTreeMap<String, String> = serde_json::from_str(&content).unwrap();
        assert_eq!(entries.get("theme").map(String::as_str), Some("dark"));
        assert!(!entries.contains_key(USER_UUID_KEY));
    }
}
