use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the geotagger library.
///
/// Every section falls back to its defaults, so a config file only needs the
/// keys it changes.
///
/// # Loading
///
/// ```rust,no_run
/// use geotagger::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.max_images = 10;
/// config.geocoder.enabled = false;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Most images the set holds at once.
    pub max_images: usize,
    /// Base path the web front end is served under.
    pub base_path: String,
    /// Output naming.
    pub export: ExportConfig,
    /// Free-text place search.
    pub geocoder: GeocoderConfig,
}

/// Names given to exported files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Prepended to the original file name of a single export.
    pub file_prefix: String,
    /// Name of the archive produced by export-all.
    pub archive_name: String,
}

/// Nominatim place search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub enabled: bool,
    /// Base URL; `/search` is appended.
    pub endpoint: String,
    /// Nominatim's usage policy requires an identifying User-Agent.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_images: 5,
            base_path: "/".to_string(),
            export: ExportConfig::default(),
            geocoder: GeocoderConfig::default(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_prefix: "geotag_".to_string(),
            archive_name: "images-with-metadata.zip".to_string(),
        }
    }
}

impl ExportConfig {
    /// Output name of a single exported image.
    pub fn output_name(&self, original_name: &str) -> String {
        format!("{}{}", self.file_prefix, original_name)
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("geotagger/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Resolve the config file path — same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;

        if config.max_images == 0 {
            log::warn!("max_images is 0; no image can be added");
        }
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}
