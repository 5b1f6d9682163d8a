//! Configuration Storage
//!
//! Reads and writes `config.json` in the app directory.
//! Location: `~/.drivelink` on macOS/Linux, `%APPDATA%\DriveLink` on Windows.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::types::{AppConfig, CONFIG_VERSION};

/// Configuration storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

/// App directory, private to this user
pub fn config_dir() -> Result<PathBuf, StorageError> {
    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("DriveLink"));
        }
        dirs::home_dir()
            .map(|home| home.join(".drivelink"))
            .ok_or(StorageError::NoConfigDir)
    }

    #[cfg(not(windows))]
    {
        dirs::home_dir()
            .map(|home| home.join(".drivelink"))
            .ok_or(StorageError::NoConfigDir)
    }
}

/// Default download directory
pub fn files_dir() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("files"))
}

/// Download directory for `config`, relative to the app directory by default
pub fn download_dir(config: &AppConfig) -> Result<PathBuf, StorageError> {
    match &config.download_dir {
        Some(dir) => Ok(dir.clone()),
        None => files_dir(),
    }
}

pub fn config_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("config.json"))
}

/// Loads and saves [`AppConfig`]
pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    /// Storage at the default path
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            path: config_file()?,
        })
    }

    /// Storage at a custom path (for testing and `--config`)
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Load the config.
    ///
    /// A missing file yields the defaults. A corrupted file is backed up and
    /// replaced by the defaults in memory.
    pub async fn load(&self) -> Result<AppConfig, StorageError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    if config.version > CONFIG_VERSION {
                        return Err(StorageError::VersionTooNew {
                            found: config.version,
                            supported: CONFIG_VERSION,
                        });
                    }
                    Ok(config)
                }
                Err(e) => {
                    tracing::warn!("Config file corrupted: {}", e);
                    match self.backup().await {
                        Ok(backup_path) => tracing::warn!(
                            "Corrupted config backed up to {:?}, using defaults",
                            backup_path
                        ),
                        Err(backup_err) => {
                            tracing::error!("Failed to backup corrupted config: {}", backup_err)
                        }
                    }
                    Ok(AppConfig::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Save the config (temp file + rename)
    pub async fn save(&self, config: &AppConfig) -> Result<(), StorageError> {
        self.ensure_dir().await?;

        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(config)?;

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Make `account` the default keychain account and persist it.
    ///
    /// Returns `false` without writing when it already is the default.
    pub async fn switch_account(
        &self,
        config: &mut AppConfig,
        account: &str,
    ) -> Result<bool, StorageError> {
        if config.account == account {
            return Ok(false);
        }
        config.account = account.to_string();
        self.save(config).await?;
        tracing::info!("Default account is now {}", account);
        Ok(true)
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Copy the current file next to itself with a timestamp suffix
    pub async fn backup(&self) -> Result<PathBuf, StorageError> {
        let backup_path = self.path.with_extension(format!(
            "json.backup.{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));

        if self.exists().await {
            fs::copy(&self.path, &backup_path).await?;
        }

        Ok(backup_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_nonexistent() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join("config.json"));

        let config = storage.load().await.unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join("nested").join("config.json"));

        let mut config = AppConfig::default();
        config.page_size = 20;
        config.editor_command = Some("nano".into());
        storage.save(&config).await.unwrap();

        let loaded = storage.load().await.unwrap();
        assert_eq!(loaded.page_size, 20);
        assert_eq!(loaded.editor_command.as_deref(), Some("nano"));
    }

    #[tokio::test]
    async fn test_corrupted_config_is_backed_up() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let storage = ConfigStorage::with_path(path);

        let config = storage.load().await.unwrap();
        assert_eq!(config, AppConfig::default());

        let backups = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("backup"))
            .count();
        assert_eq!(backups, 1);
    }

    #[tokio::test]
    async fn test_newer_version_is_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"version": 99}"#).unwrap();
        let storage = ConfigStorage::with_path(path);

        assert!(matches!(
            storage.load().await,
            Err(StorageError::VersionTooNew { found: 99, .. })
        ));
    }

    #[tokio::test]
    async fn test_switch_account_persists() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join("config.json"));
        let mut config = storage.load().await.unwrap();

        assert!(!storage.switch_account(&mut config, "default").await.unwrap());
        assert!(!storage.exists().await);

        assert!(storage.switch_account(&mut config, "work").await.unwrap());
        assert_eq!(config.account, "work");
        assert_eq!(storage.load().await.unwrap().account, "work");
    }

    #[test]
    fn test_download_dir_override() {
        let mut config = AppConfig::default();
        config.download_dir = Some(PathBuf::from("/srv/downloads"));
        assert_eq!(download_dir(&config).unwrap(), PathBuf::from("/srv/downloads"));
    }
}
