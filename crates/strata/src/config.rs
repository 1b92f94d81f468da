//! Config loading and persistence.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use strata_core::effect::{Effect, Transience};
use strata_core::meta::ClassMapSettings;

use crate::serial::DiscriminatorConvention;
use crate::telemetry::LogFormat;

#[derive(Debug, Error, Clone)]
#[error("config error: {reason}")]
pub struct ConfigError {
    pub reason: String,
}

impl ConfigError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database name in `ENV;GROUP;NAME` form.
    pub db_name: String,
    /// How `_t` is stored; hierarchical unless configured otherwise.
    pub discriminator: DiscriminatorConvention,
    pub class_map: ClassMapConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_name: "TEST;Strata;Default".to_string(),
            discriminator: DiscriminatorConvention::default(),
            class_map: ClassMapConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Serializable mirror of [`ClassMapSettings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassMapConfig {
    pub ignored_namespace_prefixes: Vec<String>,
    pub ignored_namespace_suffixes: Vec<String>,
    pub ignored_class_name_prefixes: Vec<String>,
    pub ignored_class_name_suffixes: Vec<String>,
}

impl Default for ClassMapConfig {
    fn default() -> Self {
        let settings = ClassMapSettings::default();
        Self {
            ignored_namespace_prefixes: settings.ignored_namespace_prefixes,
            ignored_namespace_suffixes: settings.ignored_namespace_suffixes,
            ignored_class_name_prefixes: settings.ignored_class_name_prefixes,
            ignored_class_name_suffixes: settings.ignored_class_name_suffixes,
        }
    }
}

impl From<ClassMapConfig> for ClassMapSettings {
    fn from(config: ClassMapConfig) -> Self {
        Self {
            ignored_namespace_prefixes: config.ignored_namespace_prefixes,
            ignored_namespace_suffixes: config.ignored_namespace_suffixes,
            ignored_class_name_prefixes: config.ignored_class_name_prefixes,
            ignored_class_name_suffixes: config.ignored_class_name_suffixes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            format: LogFormat::Compact,
        }
    }
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::new(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&contents)
        .map_err(|e| ConfigError::new(format!("failed to parse {}: {e}", path.display())))
}

/// Load the config, falling back to defaults and writing them out when the
/// file does not exist yet.
pub fn load_or_init(path: &Path) -> Config {
    if path.exists() {
        match load(path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                tracing::warn!("config load failed, using defaults: {e}");
                return Config::default();
            }
        }
    }

    let cfg = Config::default();
    if let Err(e) = write_config(path, &cfg) {
        tracing::warn!("failed to write default config: {e}");
    }
    cfg
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .map_err(|e| ConfigError::new(format!("failed to create {}: {e}", dir.display())))?;
        }
    }
    let contents = toml::to_string_pretty(cfg)
        .map_err(|e| ConfigError::new(format!("failed to render config: {e}")))?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let dir = parent_dir(path);
    let temp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| {
        ConfigError::new(format!("failed to create temp file in {}: {e}", dir.display()))
    })?;
    fs::write(temp.path(), data)
        .map_err(|e| ConfigError::new(format!("failed to write config temp file: {e}")))?;
    temp.persist(path)
        .map_err(|e| ConfigError::new(format!("failed to persist config to {}: {e}", path.display())))?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("strata.toml");
        let mut cfg = Config::default();
        cfg.db_name = "DEV;Research;Rates".to_string();
        cfg.discriminator = DiscriminatorConvention::Scalar;
        cfg.logging.format = LogFormat::Json;
        write_config(&path, &cfg).expect("write config");

        let loaded = load(&path).expect("load config");
        assert_eq!(loaded.db_name, "DEV;Research;Rates");
        assert_eq!(loaded.discriminator, DiscriminatorConvention::Scalar);
        assert_eq!(loaded.logging.format, LogFormat::Json);
    }

    #[test]
    fn load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("strata.toml");
        let cfg = load_or_init(&path);
        assert!(path.exists());
        assert_eq!(cfg.db_name, Config::default().db_name);
        // Second call reads the file it just wrote.
        let again = load_or_init(&path);
        assert_eq!(again.db_name, cfg.db_name);
    }

    #[test]
    fn class_map_config_feeds_settings() {
        let mut config = ClassMapConfig::default();
        config.ignored_class_name_suffixes = vec!["Record".to_string()];
        let settings: ClassMapSettings = config.into();
        assert_eq!(settings.map_class_name("QuoteRecord"), "Quote");
    }
}
