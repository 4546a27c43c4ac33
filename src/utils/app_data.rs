use crate::query::DEFAULT_BATCH_SIZE;
use crate::utils::known_folder::{KnownFolder, resolve_known_folder};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "searchprime";
const CONFIG_FILE: &str = "config.json";

/// Application configuration stored in the app data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Rows fetched per round trip; 0 means the default
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Keep administration and query service handles between calls
    #[serde(default = "default_cache_service_handles")]
    pub cache_service_handles: bool,

    /// Roots the daemon crawls. Empty means the Documents and Desktop folders.
    #[serde(default)]
    pub crawl_roots: Vec<PathBuf>,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_cache_service_handles() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            cache_service_handles: default_cache_service_handles(),
            crawl_roots: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path).context("Failed to read config file")?;
            let config: AppConfig =
                serde_json::from_str(&content).context("Failed to parse config file")?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the app data directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Get the effective batch size (resolves 0 to the default)
    pub fn effective_batch_size(&self) -> usize {
        if self.batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            self.batch_size
        }
    }

    /// Configured crawl roots, or the user's Documents and Desktop folders
    pub fn effective_crawl_roots(&self) -> Vec<PathBuf> {
        if !self.crawl_roots.is_empty() {
            return self.crawl_roots.clone();
        }

        [KnownFolder::Documents, KnownFolder::Desktop]
            .into_iter()
            .filter_map(|folder| resolve_known_folder(folder).ok())
            .filter(|path| path.is_dir())
            .collect()
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}
