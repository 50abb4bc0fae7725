use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Name under which the completion API key is stored.
pub const API_KEY_NAME: &str = "perplexity.apiKey";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Secret storage keyed by name. A missing secret is `None`, not an error.
pub trait CredentialStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, secret: &str) -> Result<(), CredentialError>;
    fn remove(&self, name: &str) -> Result<(), CredentialError>;
}

/// Secrets persisted as a JSON map (mode 0o600).
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.pilot/credentials.json`
    pub fn default_location() -> Self {
        Self::new(crate::config::pilot_dir().join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default()
    }

    fn write_all(&self, secrets: &BTreeMap<String, String>) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(secrets)?;
        std::fs::write(&self.path, data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl CredentialStore for FileCredentials {
    fn get(&self, name: &str) -> Option<String> {
        self.read_all().remove(name).filter(|s| !s.is_empty())
    }

    fn set(&self, name: &str, secret: &str) -> Result<(), CredentialError> {
        let mut secrets = self.read_all();
        secrets.insert(name.to_string(), secret.to_string());
        self.write_all(&secrets)
    }

    fn remove(&self, name: &str) -> Result<(), CredentialError> {
        let mut secrets = self.read_all();
        if secrets.remove(name).is_none() {
            return Ok(());
        }
        if secrets.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        self.write_all(&secrets)
    }
}

/// In-process secrets, used for `--api-key` overrides.
#[derive(Default)]
pub struct MemoryCredentials {
    secrets: Mutex<BTreeMap<String, String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(key: impl Into<String>) -> Self {
        let store = Self::new();
        if let Ok(mut secrets) = store.secrets.lock() {
            secrets.insert(API_KEY_NAME.to_string(), key.into());
        }
        store
    }
}

impl CredentialStore for MemoryCredentials {
    fn get(&self, name: &str) -> Option<String> {
        self.secrets.lock().ok()?.get(name).cloned()
    }

    fn set(&self, name: &str, secret: &str) -> Result<(), CredentialError> {
        if let Ok(mut secrets) = self.secrets.lock() {
            secrets.insert(name.to_string(), secret.to_string());
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), CredentialError> {
        if let Ok(mut secrets) = self.secrets.lock() {
            secrets.remove(name);
        }
        Ok(())
    }
}
