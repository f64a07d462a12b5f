use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tenny_client::TokenStore;
use tracing::warn;

pub fn tenny_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".tenny"))
}

pub fn ensure_tenny_home() -> Result<PathBuf> {
    let dir = tenny_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn auth_path() -> Result<PathBuf> {
    Ok(ensure_tenny_home()?.join("auth.json"))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct AuthFile {
    token: Option<String>,
}

/// Bearer token persisted as JSON so it survives between invocations
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<AuthFile> {
        if !self.path.exists() {
            return Ok(AuthFile::default());
        }
        let s = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        Ok(serde_json::from_str(&s)?)
    }

    fn write(&self, auth: &AuthFile) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        let s = serde_json::to_string_pretty(auth)?;
        fs::write(&self.path, s).with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }
}

// `TokenStore` is infallible; disk problems are logged and the session
// carries on in memory for this run.
impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        match self.read() {
            Ok(auth) => auth.token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("ignoring unreadable {}: {e:#}", self.path.display());
                None
            }
        }
    }

    fn save(&self, token: &str) {
        let auth = AuthFile {
            token: Some(token.to_string()),
        };
        if let Err(e) = self.write(&auth) {
            warn!("could not persist token: {e:#}");
        }
    }

    fn clear(&self) {
        if let Err(e) = self.write(&AuthFile::default()) {
            warn!("could not clear token: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("auth.json"));
        assert_eq!(store.load(), None);

        store.save("tok-9");
        assert_eq!(FileTokenStore::new(store.path()).load().as_deref(), Some("tok-9"));

        store.clear();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_corrupt_file_reads_as_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(FileTokenStore::new(&path).load(), None);
    }
}
