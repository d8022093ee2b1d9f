//! Configuration Storage
//!
//! Resolves the application data directory and reads/writes `settings.json`.
//! Data location: ~/.vlsm-deploy on macOS/Linux, %APPDATA%\VlsmDeploy on Windows.
//! `VLSM_DEPLOY_DATA_DIR` overrides both.

use std::path::{Path, PathBuf};
use tokio::fs;

use super::settings::{DeploySettings, SETTINGS_VERSION};

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "VLSM_DEPLOY_DATA_DIR";

/// Raw 32-byte symmetric key
pub const KEY_FILENAME: &str = "secret.key";

/// Three-line encrypted credential record
pub const CREDENTIALS_FILENAME: &str = "credentials.enc";

const SETTINGS_FILENAME: &str = "settings.json";

/// Configuration storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

/// Get the application data directory
pub fn data_dir() -> Result<PathBuf, StorageError> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("VlsmDeploy"));
        }
        dirs::home_dir()
            .map(|home| home.join(".vlsm-deploy"))
            .ok_or(StorageError::NoDataDir)
    }

    #[cfg(not(windows))]
    {
        dirs::home_dir()
            .map(|home| home.join(".vlsm-deploy"))
            .ok_or(StorageError::NoDataDir)
    }
}

/// Key file path inside `dir`
pub fn key_file(dir: &Path) -> PathBuf {
    dir.join(KEY_FILENAME)
}

/// Credential record path inside `dir`
pub fn credentials_file(dir: &Path) -> PathBuf {
    dir.join(CREDENTIALS_FILENAME)
}

/// Settings storage manager
pub struct SettingsStorage {
    path: PathBuf,
}

impl SettingsStorage {
    /// Storage rooted in the default data directory
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            path: data_dir()?.join(SETTINGS_FILENAME),
        })
    }

    /// Storage with a custom path (for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load settings from disk
    ///
    /// Missing file yields defaults. A file that fails to parse is backed up
    /// and replaced by defaults in memory.
    pub async fn load(&self) -> Result<DeploySettings, StorageError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => match serde_json::from_str::<DeploySettings>(&contents) {
                Ok(settings) => {
                    if settings.version > SETTINGS_VERSION {
                        return Err(StorageError::VersionTooNew {
                            found: settings.version,
                            supported: SETTINGS_VERSION,
                        });
                    }
                    Ok(settings)
                }
                Err(e) => {
                    tracing::warn!("Settings file corrupted: {}", e);

                    match self.backup().await {
                        Ok(backup_path) => {
                            tracing::warn!(
                                "Corrupted settings backed up to {:?}, using defaults",
                                backup_path
                            );
                        }
                        Err(backup_err) => {
                            tracing::error!("Failed to backup corrupted settings: {}", backup_err);
                        }
                    }

                    Ok(DeploySettings::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeploySettings::default()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Copy the current settings file to a timestamped sibling
    async fn backup(&self) -> Result<PathBuf, StorageError> {
        let backup_path = self.path.with_extension(format!(
            "json.backup.{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));

        fs::copy(&self.path, &backup_path).await?;
        Ok(backup_path)
    }
}
