//! Collection configuration.
//!
//! Configuration is read from `.lightbox.yaml` in the watched folder (or the
//! file named by `LIGHTBOX_CONFIG`) and includes:
//! - The debounce window for folder change notifications
//! - The file extensions treated as images
//! - The preview thumbnail size
//! - Tag names assigned to files by stem

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LightboxError, Result};
use crate::record::DEFAULT_PREVIEW_MAX_PIXEL_SIZE;
use crate::tag::TagCatalog;
use crate::types::{DEFAULT_IMAGE_EXTENSIONS, FileTypeFilter};

/// Name of the per-folder configuration file.
pub const CONFIG_FILE_NAME: &str = ".lightbox.yaml";

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "LIGHTBOX_CONFIG";

/// Environment variable overriding `debounce_ms`.
pub const DEBOUNCE_ENV: &str = "LIGHTBOX_DEBOUNCE_MS";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Quiet period, in milliseconds, before a burst of folder events
    /// triggers a rescan (default: 350)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Extensions recognized as image files
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Longer edge of generated previews, in pixels (default: 160)
    #[serde(default = "default_preview_max_pixel_size")]
    pub preview_max_pixel_size: u32,

    /// Tag names keyed by file name without extension
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Vec<String>>,
}

fn default_debounce_ms() -> u64 {
    350
}

fn default_extensions() -> Vec<String> {
    DEFAULT_IMAGE_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_preview_max_pixel_size() -> u32 {
    DEFAULT_PREVIEW_MAX_PIXEL_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debounce_ms: default_debounce_ms(),
            extensions: default_extensions(),
            preview_max_pixel_size: default_preview_max_pixel_size(),
            tags: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Path of the configuration file for a watched folder.
    pub fn config_path(root: &Path) -> PathBuf {
        match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => root.join(CONFIG_FILE_NAME),
        }
    }

    /// Load configuration for `root`, or return defaults if no file exists.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::config_path(root);
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                LightboxError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read config at {}: {}", path.display(), e),
                ))
            })?;
            Self::from_yaml(&content)?
        } else {
            Config::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml_ng::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = env::var(DEBOUNCE_ENV)
            && !value.is_empty()
        {
            self.debounce_ms = value.trim().parse().map_err(|_| {
                LightboxError::Config(format!("{DEBOUNCE_ENV} must be a number of milliseconds, got '{value}'"))
            })?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            return Err(LightboxError::Config(
                "debounce_ms must be greater than zero".to_string(),
            ));
        }
        if self.file_type_filter().is_empty() {
            return Err(LightboxError::Config(
                "extensions must name at least one file type".to_string(),
            ));
        }
        if self.preview_max_pixel_size == 0 {
            return Err(LightboxError::Config(
                "preview_max_pixel_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn file_type_filter(&self) -> FileTypeFilter {
        FileTypeFilter::from_extensions(&self.extensions)
    }

    pub fn tag_catalog(&self) -> TagCatalog {
        TagCatalog::new(&self.tags)
    }
}
