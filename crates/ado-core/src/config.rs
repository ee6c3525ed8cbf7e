//! Configuration management for ado-mcp-tools.
//!
//! Handles loading and saving configuration from TOML files.
//! Config files are stored in platform-specific locations:
//!
//! - **macOS/Linux**: `~/.config/ado-mcp-tools/config.toml`
//! - **Windows**: `%APPDATA%\ado-mcp-tools\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use ado_core::config::Config;
//!
//! let mut config = Config::load()?;
//! config.set("downloads.stale_after_hours", "48")?;
//! config.save()?;
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Config file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config directory name.
const CONFIG_DIR_NAME: &str = "ado-mcp-tools";

/// Default name prefix of the per-process download root.
pub const DEFAULT_ROOT_PREFIX: &str = "ado-mcp-server";

/// Default age after which an orphaned download root is purged.
pub const DEFAULT_STALE_AFTER_HOURS: u64 = 24;

// =============================================================================
// Configuration structures
// =============================================================================

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download staging configuration
    #[serde(default)]
    pub downloads: DownloadsConfig,
}

/// Download staging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadsConfig {
    /// Directory the per-process roots live in (platform temp dir when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Name prefix of the per-process root, `{prefix}-{pid}`
    #[serde(default = "default_root_prefix")]
    pub root_prefix: String,

    /// Orphaned roots older than this are purged at startup
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: u64,

    /// Remove this process's root when the server shuts down
    #[serde(default = "default_cleanup_on_exit")]
    pub cleanup_on_exit: bool,
}

fn default_root_prefix() -> String {
    DEFAULT_ROOT_PREFIX.to_string()
}

fn default_stale_after_hours() -> u64 {
    DEFAULT_STALE_AFTER_HOURS
}

fn default_cleanup_on_exit() -> bool {
    true
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            root_prefix: default_root_prefix(),
            stale_after_hours: default_stale_after_hours(),
            cleanup_on_exit: default_cleanup_on_exit(),
        }
    }
}

impl DownloadsConfig {
    /// Directory the download roots are created in.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Staleness threshold as a duration.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_hours.saturating_mul(3600))
    }
}

// =============================================================================
// Config implementation
// =============================================================================

impl Config {
    /// Get the configuration directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(CONFIG_DIR_NAME))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location.
    ///
    /// Returns a default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// Returns a default config if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = ?path, "Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        debug!(path = ?path, "Loading config");

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        info!(path = ?path, "Config loaded successfully");
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        debug!(path = ?path, "Saving config");

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        info!(path = ?path, "Config saved successfully");
        Ok(())
    }

    /// Set a configuration value by key path.
    ///
    /// Key format: `section.field` (e.g., `downloads.root_prefix`)
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let (section, field) = split_key(key)?;

        match section {
            "downloads" => {
                let config = &mut self.downloads;
                match field {
                    "temp_dir" => {
                        config.temp_dir = if value.trim().is_empty() {
                            None
                        } else {
                            Some(PathBuf::from(value))
                        }
                    }
                    "root_prefix" | "prefix" => {
                        if value.is_empty() || value.contains(['/', '\\']) {
                            return Err(Error::Config(format!(
                                "Invalid root prefix '{}'",
                                value
                            )));
                        }
                        config.root_prefix = value.to_string();
                    }
                    "stale_after_hours" => {
                        config.stale_after_hours = value.parse().map_err(|_| {
                            Error::Config(format!("Expected a number of hours, got '{}'", value))
                        })?;
                    }
                    "cleanup_on_exit" => {
                        config.cleanup_on_exit = value.parse().map_err(|_| {
                            Error::Config(format!("Expected true or false, got '{}'", value))
                        })?;
                    }
                    _ => {
                        return Err(Error::Config(format!(
                            "Unknown downloads config field: {}",
                            field
                        )))
                    }
                }
            }
            _ => {
                return Err(Error::Config(format!("Unknown config section: {}", section)));
            }
        }

        Ok(())
    }

    /// Get a configuration value by key path.
    ///
    /// Key format: `section.field` (e.g., `downloads.temp_dir`)
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let (section, field) = split_key(key)?;

        match section {
            "downloads" => {
                let config = &self.downloads;
                match field {
                    "temp_dir" => Ok(config
                        .temp_dir
                        .as_ref()
                        .map(|p| p.display().to_string())),
                    "root_prefix" | "prefix" => Ok(Some(config.root_prefix.clone())),
                    "stale_after_hours" => Ok(Some(config.stale_after_hours.to_string())),
                    "cleanup_on_exit" => Ok(Some(config.cleanup_on_exit.to_string())),
                    _ => Err(Error::Config(format!(
                        "Unknown downloads config field: {}",
                        field
                    ))),
                }
            }
            _ => Err(Error::Config(format!("Unknown config section: {}", section))),
        }
    }
}

fn split_key(key: &str) -> Result<(&str, &str)> {
    match key.split('.').collect::<Vec<_>>().as_slice() {
        [section, field] => Ok((*section, *field)),
        _ => Err(Error::Config(format!(
            "Invalid config key '{}'. Expected format: section.field",
            key
        ))),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.downloads.temp_dir.is_none());
        assert_eq!(config.downloads.root_prefix, "ado-mcp-server");
        assert_eq!(config.downloads.stale_after_hours, 24);
        assert!(config.downloads.cleanup_on_exit);
        assert_eq!(config.downloads.stale_after(), Duration::from_secs(86_400));
        assert_eq!(config.downloads.temp_dir(), std::env::temp_dir());
    }

    #[test]
    fn test_set_and_get() {
        let mut config = Config::default();

        config.set("downloads.temp_dir", "/var/tmp").unwrap();
        config.set("downloads.stale_after_hours", "6").unwrap();
        config.set("downloads.cleanup_on_exit", "false").unwrap();
        config.set("downloads.prefix", "ado-test").unwrap();

        assert_eq!(
            config.get("downloads.temp_dir").unwrap(),
            Some("/var/tmp".to_string())
        );
        assert_eq!(
            config.get("downloads.stale_after_hours").unwrap(),
            Some("6".to_string())
        );
        assert_eq!(
            config.get("downloads.root_prefix").unwrap(),
            Some("ado-test".to_string())
        );
        assert!(!config.downloads.cleanup_on_exit);
        assert_eq!(config.downloads.temp_dir(), PathBuf::from("/var/tmp"));

        config.set("downloads.temp_dir", "").unwrap();
        assert_eq!(config.get("downloads.temp_dir").unwrap(), None);
    }

    #[test]
    fn test_invalid_key() {
        let mut config = Config::default();

        assert!(config.set("invalid", "value").is_err());
        assert!(config.set("too.many.parts", "value").is_err());
        assert!(config.set("unknown.field", "value").is_err());
        assert!(config.set("downloads.unknown_field", "value").is_err());
        assert!(config.get("downloads.unknown_field").is_err());
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();

        assert!(config.set("downloads.stale_after_hours", "soon").is_err());
        assert!(config.set("downloads.cleanup_on_exit", "yes").is_err());
        assert!(config.set("downloads.root_prefix", "a/b").is_err());
        assert!(config.set("downloads.root_prefix", "").is_err());
        assert_eq!(config.downloads.root_prefix, "ado-mcp-server");
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.downloads.stale_after_hours = 12;
        config.downloads.temp_dir = Some(PathBuf::from("/data/tmp"));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        config.save_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[downloads]"));
        assert!(contents.contains("stale_after_hours = 12"));

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.downloads.stale_after_hours, 12);
        assert_eq!(loaded.downloads.temp_dir, Some(PathBuf::from("/data/tmp")));
    }

    #[test]
    fn test_load_nonexistent() {
        let path = PathBuf::from("/nonexistent/path/config.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.downloads.root_prefix, DEFAULT_ROOT_PREFIX);
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let parsed: Config = toml::from_str("[downloads]\ncleanup_on_exit = false\n").unwrap();
        assert!(!parsed.downloads.cleanup_on_exit);
        assert_eq!(parsed.downloads.stale_after_hours, DEFAULT_STALE_AFTER_HOURS);
        assert_eq!(parsed.downloads.root_prefix, DEFAULT_ROOT_PREFIX);

        let empty: Config = toml::from_str("").unwrap();
        assert!(empty.downloads.cleanup_on_exit);
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[downloads\nbroken").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
