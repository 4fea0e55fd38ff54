use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use shiori_api::Credential;

use crate::config::AppConfig;
use crate::error::ShioriError;

/// Contents of the preference store file. Keyed, last write wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredPrefs {
    /// Auto-sync preference; `None` means "use the config default".
    pub auto_sync: Option<bool>,
    /// Credential from the last successful authentication.
    pub credential: Option<Credential>,
}

/// File-backed persistence for the auto-sync preference and the credential.
///
/// A missing or unreadable file degrades to defaults; persistence failures
/// are reported but never fatal.
#[derive(Debug, Clone)]
pub struct PrefStore {
    path: PathBuf,
}

impl PrefStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location under the project data dir.
    pub fn default_location() -> Self {
        Self::new(AppConfig::store_path())
    }

    /// Read the store, falling back to defaults when missing or malformed.
    pub fn load(&self) -> StoredPrefs {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => toml::from_str(&s).unwrap_or_else(|e| {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "malformed preference store, using defaults"
                );
                StoredPrefs::default()
            }),
            Err(_) => StoredPrefs::default(),
        }
    }

    pub fn set_auto_sync(&self, enabled: bool) -> Result<(), ShioriError> {
        let mut prefs = self.load();
        prefs.auto_sync = Some(enabled);
        self.save(&prefs)
    }

    pub fn set_credential(&self, credential: &Credential) -> Result<(), ShioriError> {
        let mut prefs = self.load();
        prefs.credential = Some(credential.clone());
        self.save(&prefs)
    }

    pub fn clear_credential(&self) -> Result<(), ShioriError> {
        let mut prefs = self.load();
        prefs.credential = None;
        self.save(&prefs)
    }

    fn save(&self, prefs: &StoredPrefs) -> Result<(), ShioriError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(prefs).map_err(|e| ShioriError::Store(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
