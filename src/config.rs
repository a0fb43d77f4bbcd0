use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "recipe-sync";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Suffix appended to every partition name; bump on each deployed release
  pub cache_version: String,
  /// When false, content caching is disabled and every lookup misses
  pub caching_enabled: bool,
  pub api: ApiConfig,
  pub app: AppConfig,
  pub storage: StorageConfig,
  pub network: NetworkConfig,
  pub logging: LoggingConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      cache_version: "v1".to_string(),
      caching_enabled: true,
      api: ApiConfig::default(),
      app: AppConfig::default(),
      storage: StorageConfig::default(),
      network: NetworkConfig::default(),
      logging: LoggingConfig::default(),
    }
  }
}

/// Location conventions of the external recipe API.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Path of the single-recipe lookup endpoint (takes `?i=<mealId>`)
  pub lookup_path: String,
  /// Any request under this path on the API host is treated as recipe data
  pub lookup_prefix: String,
  /// Any request under this path on the API host is treated as an image
  pub image_prefix: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "https://www.themealdb.com".to_string(),
      lookup_path: "/api/json/v1/1/lookup.php".to_string(),
      lookup_prefix: "/api/json/".to_string(),
      image_prefix: "/images/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// Origin the application shell is served from
  pub origin: String,
  /// Paths pre-cached on install so the app boots offline
  pub shell: Vec<String>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      origin: "http://localhost:3000".to_string(),
      shell: vec!["/".to_string(), "/manifest.json".to_string()],
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Override for the directory holding `offline.db`
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self { timeout_secs: 30 }
  }
}

impl NetworkConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter directive used when RUST_LOG is not set
  pub filter: String,
  /// Write a daily rolling log file here instead of stderr
  pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      filter: "warn".to_string(),
      directory: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./recipe-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/recipe-sync/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from(format!("{}.yaml", APP_NAME));
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join(APP_NAME).join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Directory holding the offline database.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.storage.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join(APP_NAME))
  }
}
