//! Optional TOML configuration file.
//!
//! Every field is optional; absent fields keep the built-in defaults and CLI
//! flags override whatever the file sets.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::engine::EngineConfig;

const APP_DIR: &str = "ads-downloader";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    fn out_of_range(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::OutOfRange {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// File-backed defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub output_dir: Option<PathBuf>,
    /// Settings database path.
    pub db_path: Option<PathBuf>,
    pub item_delay_ms: Option<u64>,
    pub candidate_delay_ms: Option<u64>,
    pub mutation_debounce_ms: Option<u64>,
    pub viewport_debounce_ms: Option<u64>,
    pub min_region_width: Option<f64>,
    pub min_region_height: Option<f64>,
    pub min_image_width: Option<f64>,
    pub min_image_height: Option<f64>,
    /// Replaces the content-CDN host patterns.
    pub cdn_patterns: Option<Vec<String>>,
    pub marker_attribute: Option<String>,
    pub marker_value: Option<String>,
    pub include_offscreen: Option<bool>,
}

impl FileConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first value outside its
    /// allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("item_delay_ms", self.item_delay_ms),
            ("candidate_delay_ms", self.candidate_delay_ms),
            ("mutation_debounce_ms", self.mutation_debounce_ms),
            ("viewport_debounce_ms", self.viewport_debounce_ms),
        ] {
            if let Some(value) = value
                && value > 60_000
            {
                return Err(ConfigError::out_of_range(field, value, "0..=60000"));
            }
        }
        for (field, value) in [
            ("min_region_width", self.min_region_width),
            ("min_region_height", self.min_region_height),
            ("min_image_width", self.min_image_width),
            ("min_image_height", self.min_image_height),
        ] {
            if let Some(value) = value
                && !(0.0..=10_000.0).contains(&value)
            {
                return Err(ConfigError::out_of_range(field, value, "0..=10000"));
            }
        }
        if let Some(patterns) = &self.cdn_patterns
            && patterns.iter().any(|p| p.trim().is_empty())
        {
            return Err(ConfigError::out_of_range(
                "cdn_patterns",
                format!("{patterns:?}"),
                "non-empty host fragments",
            ));
        }
        Ok(())
    }

    /// Overlays the file's values on `config`.
    pub fn apply_to(&self, config: &mut EngineConfig) {
        let ms = Duration::from_millis;
        if let Some(v) = self.item_delay_ms {
            config.pacing.item_delay = ms(v);
        }
        if let Some(v) = self.candidate_delay_ms {
            config.pacing.candidate_delay = ms(v);
        }
        if let Some(v) = self.mutation_debounce_ms {
            config.debounce.mutation = ms(v);
        }
        if let Some(v) = self.viewport_debounce_ms {
            config.debounce.viewport = ms(v);
        }
        if let Some(v) = self.min_region_width {
            config.discovery.min_region_width = v;
        }
        if let Some(v) = self.min_region_height {
            config.discovery.min_region_height = v;
        }
        if let Some(v) = self.min_image_width {
            config.media.min_image_width = v;
        }
        if let Some(v) = self.min_image_height {
            config.media.min_image_height = v;
        }
        if let Some(patterns) = &self.cdn_patterns {
            config.media.cdn_patterns.clone_from(patterns);
        }
        if let Some(v) = &self.marker_attribute {
            config.discovery.marker_attribute.clone_from(v);
        }
        if let Some(v) = &self.marker_value {
            config.discovery.marker_value.clone_from(v);
        }
        if let Some(v) = self.include_offscreen {
            config.visible_only = !v;
        }
    }
}

/// Default config location.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/ads-downloader/config.toml`
/// 2. `$HOME/.config/ads-downloader/config.toml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = env_var_non_empty("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join(APP_DIR).join(CONFIG_FILE));
    }
    let home = env_var_non_empty("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE),
    )
}

fn env_var_non_empty(name: &str) -> Option<std::ffi::OsString> {
    env::var_os(name).filter(|value| !value.is_empty())
}

/// Parses and validates a config file.
///
/// # Errors
///
/// Fails when the file cannot be read, is not valid TOML for
/// [`FileConfig`], or holds out-of-range values.
pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: FileConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads `explicit` if given, else the default path when it exists.
///
/// # Errors
///
/// See [`load_file`]. A missing default file is not an error; a missing
/// explicit file is.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_file(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => load_file(&path),
        _ => Ok(FileConfig::default()),
    }
}
