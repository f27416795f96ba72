use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    aggregator::AggregatorSettings,
    model::Coordinate,
    provider::openmeteo::{DEFAULT_ARCHIVE_URL, DEFAULT_FORECAST_URL},
};

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// forecast_base_url = "https://api.open-meteo.com"
/// archive_base_url = "https://archive-api.open-meteo.com"
/// fetch_timeout_secs = 20
///
/// [default_location]
/// latitude = 51.5
/// longitude = -0.12
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub forecast_base_url: String,
    pub archive_base_url: String,

    /// Per-fetch deadline. Unset means a fetch may take as long as the
    /// HTTP client allows, and a hung fetch holds back the weekly result.
    pub fetch_timeout_secs: Option<u64>,

    /// Used when no coordinate is given on the command line.
    pub default_location: Option<Coordinate>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            forecast_base_url: DEFAULT_FORECAST_URL.to_string(),
            archive_base_url: DEFAULT_ARCHIVE_URL.to_string(),
            fetch_timeout_secs: None,
            default_location: None,
        }
    }
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "yearago", "yearago-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Coordinate to use when the caller gave none.
    pub fn location_or(&self, explicit: Option<Coordinate>) -> Result<Coordinate> {
        explicit.or(self.default_location).ok_or_else(|| {
            anyhow!(
                "No location given and no default location configured.\n\
                 Hint: pass --lat and --lon, or run `yearago configure` first."
            )
        })
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }

    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings { fetch_timeout: self.fetch_timeout() }
    }
}
