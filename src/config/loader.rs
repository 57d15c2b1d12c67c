// src/config/loader.rs
//! Layered configuration loader: defaults, TOML files, then environment overrides

use crate::config::{constants::paths, StreamConfig};
use crate::error::ConfigError;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Configuration loader
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    current_config: Arc<RwLock<StreamConfig>>,
}

impl ConfigLoader {
    /// Create new configuration loader with the discovered search paths
    pub fn new() -> Self {
        Self::with_paths(Self::discover_config_paths())
    }

    /// Create loader with custom paths, later paths taking precedence
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            current_config: Arc::new(RwLock::new(StreamConfig::default())),
        }
    }

    /// Search paths in merge order
    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    /// Load stream configuration with validation
    pub fn load_stream_config(&mut self) -> Result<StreamConfig, ConfigError> {
        let config = self.load_and_merge_configs()?;
        *self.current_config.write() = config.clone();
        info!(summary = ?config.get_summary(), "stream configuration loaded");
        Ok(config)
    }

    /// Get current configuration
    pub fn get_current_config(&self) -> StreamConfig {
        self.current_config.read().clone()
    }

    /// Validate a configuration file on its own, on top of the defaults
    pub fn validate_config_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let mut merged = Self::default_value()?;
        let file_value = self.load_config_file(path.as_ref())?;
        self.merge_toml_values(&mut merged, file_value);
        Self::into_validated(merged).map(|_| ())
    }

    /// Export current configuration to file
    pub fn export_config<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let config = self.get_current_config();
        let toml_content =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        let path = path.as_ref();
        std::fs::write(path, toml_content).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Get configuration file modification times
    pub fn get_config_timestamps(&self) -> Vec<(PathBuf, Option<SystemTime>)> {
        self.config_paths
            .iter()
            .map(|path| {
                let timestamp = std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
                (path.clone(), timestamp)
            })
            .collect()
    }

    fn default_value() -> Result<toml::Value, ConfigError> {
        toml::Value::try_from(StreamConfig::default()).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    fn into_validated(value: toml::Value) -> Result<StreamConfig, ConfigError> {
        let config: StreamConfig = value
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        config.validate_consistency().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn load_and_merge_configs(&self) -> Result<StreamConfig, ConfigError> {
        let mut merged_config = Self::default_value()?;

        for config_path in &self.config_paths {
            if config_path.exists() {
                let file_config = self.load_config_file(config_path)?;
                debug!(path = %config_path.display(), "merging configuration file");
                self.merge_toml_values(&mut merged_config, file_config);
            }
        }

        self.apply_environment_overrides(&mut merged_config);
        Self::into_validated(merged_config)
    }

    fn load_config_file(&self, path: &Path) -> Result<toml::Value, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }

    fn merge_toml_values(&self, base: &mut toml::Value, overlay: toml::Value) {
        match (base, overlay) {
            (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
                for (key, value) in overlay_table {
                    if let Some(base_value) = base_table.get_mut(&key) {
                        self.merge_toml_values(base_value, value);
                    } else {
                        base_table.insert(key, value);
                    }
                }
            }
            (base_value, overlay_value) => {
                *base_value = overlay_value;
            }
        }
    }

    /// `EMG_STREAM__BUFFERS__HIGH_WATER_MARK=8000` sets `buffers.high_water_mark`
    fn apply_environment_overrides(&self, config: &mut toml::Value) {
        for (key, value) in std::env::vars() {
            let Some(stripped) = key.strip_prefix(paths::ENV_PREFIX) else {
                continue;
            };
            let path: Vec<String> = stripped
                .split(paths::ENV_SEPARATOR)
                .filter(|part| !part.is_empty())
                .map(|part| part.to_lowercase())
                .collect();
            if path.is_empty() {
                continue;
            }
            debug!(variable = %key, "applying environment override");
            self.set_nested_value(config, &path, self.parse_env_value(&value));
        }
    }

    fn parse_env_value(&self, value: &str) -> toml::Value {
        let trimmed = value.trim();
        if let Ok(int_val) = trimmed.parse::<i64>() {
            toml::Value::Integer(int_val)
        } else if let Ok(float_val) = trimmed.parse::<f64>() {
            toml::Value::Float(float_val)
        } else if let Ok(bool_val) = trimmed.parse::<bool>() {
            toml::Value::Boolean(bool_val)
        } else if trimmed.starts_with('[') {
            // Arrays go through the TOML parser as an inline value
            toml::from_str::<toml::value::Table>(&format!("v = {trimmed}"))
                .ok()
                .and_then(|mut table| table.remove("v"))
                .unwrap_or_else(|| toml::Value::String(value.to_string()))
        } else {
            toml::Value::String(value.to_string())
        }
    }

    fn set_nested_value(&self, config: &mut toml::Value, path: &[String], value: toml::Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut current = config;
        for part in parents {
            let toml::Value::Table(table) = current else {
                return;
            };
            current = table
                .entry(part.clone())
                .or_insert_with(|| toml::Value::Table(toml::value::Table::new()));
        }
        if let toml::Value::Table(table) = current {
            table.insert(last.clone(), value);
        }
    }

    fn discover_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from(paths::SYSTEM_CONFIG_PATH));

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(paths::USER_CONFIG_DIR).join("config.toml"));
        }

        // Local configurations (in order of precedence)
        paths.push(PathBuf::from(paths::DEFAULT_CONFIG_FILE));
        paths.push(PathBuf::from(paths::LOCAL_CONFIG_FILE));

        paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var_os("USERPROFILE").map(PathBuf::from)
        }
        #[cfg(not(target_os = "windows"))]
        {
            std::env::var_os("HOME").map(PathBuf::from)
        }
    }
}
