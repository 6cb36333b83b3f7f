//! Runtime configuration management
//!
//! Combines the static TOML configuration with the user settings file,
//! which the CLI updates and saves on its own.

use ledboard_core::{
    config::SETTINGS_FILE_NAME, LedBoardError, Result, Settings, StaticConfig,
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

/// Static configuration plus mutable user settings
pub struct RuntimeConfig {
    /// Static configuration (immutable after load)
    static_config: StaticConfig,

    settings: RwLock<Settings>,
}

impl RuntimeConfig {
    /// Load all configuration from disk.
    ///
    /// A missing config file is created with defaults, as is the data
    /// directory. A missing settings file yields default settings; it is
    /// only written on the first save.
    pub async fn load(config_path: &Path) -> Result<Self> {
        info!("Loading configuration from: {}", config_path.display());

        let static_config = Self::load_static_config(config_path).await?;
        Self::ensure_data_dir(&static_config.data_dir).await?;
        let settings = Self::load_settings(&static_config.data_dir).await?;

        Ok(Self {
            static_config,
            settings: RwLock::new(settings),
        })
    }

    /// Load static config from TOML file, creating with defaults if missing.
    async fn load_static_config(path: &Path) -> Result<StaticConfig> {
        if !path.exists() {
            info!(
                "Static config not found at {}. Creating with defaults.",
                path.display()
            );

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    LedBoardError::Config(format!(
                        "Failed to create config directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }

            let config = StaticConfig::default();
            let toml_str = config
                .to_toml()
                .map_err(|e| LedBoardError::Config(format!("Failed to serialize config: {}", e)))?;

            fs::write(path, &toml_str).await.map_err(|e| {
                LedBoardError::Config(format!("Failed to write config file: {}", e))
            })?;

            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| LedBoardError::Config(format!("Failed to read config file: {}", e)))?;

        StaticConfig::from_toml(&content)
            .map_err(|e| LedBoardError::Config(format!("Failed to parse config file: {}", e)))
    }

    async fn ensure_data_dir(data_dir: &Path) -> Result<()> {
        if !data_dir.exists() {
            info!("Creating data directory: {}", data_dir.display());
            fs::create_dir_all(data_dir).await.map_err(|e| {
                LedBoardError::Config(format!(
                    "Failed to create data directory '{}': {}",
                    data_dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    async fn load_settings(data_dir: &Path) -> Result<Settings> {
        let path = data_dir.join(SETTINGS_FILE_NAME);
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| LedBoardError::Config(format!("Failed to read settings: {}", e)))?;

        Settings::from_json(&content).map_err(|e| {
            LedBoardError::Config(format!(
                "Failed to parse settings '{}': {}",
                path.display(),
                e
            ))
        })
    }

    pub fn static_config(&self) -> &StaticConfig {
        &self.static_config
    }

    pub fn data_dir(&self) -> &Path {
        &self.static_config.data_dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir().join(SETTINGS_FILE_NAME)
    }

    pub async fn settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().await
    }

    /// Remember the firmware image used last and save the settings
    pub async fn set_firmware_path(&self, path: PathBuf) -> Result<()> {
        self.settings.write().await.firmware_path = Some(path);
        self.save_settings().await
    }

    pub async fn save_settings(&self) -> Result<()> {
        let path = self.settings_path();
        let json = self.settings.read().await.to_json()?;

        Self::ensure_data_dir(self.data_dir()).await?;
        fs::write(&path, json).await.map_err(|e| {
            LedBoardError::Config(format!(
                "Failed to write settings '{}': {}",
                path.display(),
                e
            ))
        })?;

        debug!("Saved settings to {}", path.display());
        Ok(())
    }
}
