use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::storage::error::StorageSystemError;

type Result<T> = std::result::Result<T, StorageSystemError>;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }
}

/// Application configuration: one top-level section per module.
///
/// ```json
/// { "keystone-server": { "port": 5678 }, "keystone-logger": { "level": "debug" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigData {
    /// Raw configuration values
    #[serde(flatten)]
    values: HashMap<String, serde_json::Value>,
}

impl ConfigData {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self { values: HashMap::new() }
    }

    pub fn from_hashmap(values: HashMap<String, serde_json::Value>) -> Self {
        Self { values }
    }

    /// Build from a JSON object; any other JSON value yields an empty config
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Self { values: map.into_iter().collect() },
            _ => Self::new(),
        }
    }

    /// Get a configuration value; `None` if missing or of another type
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Get a configuration value with default
    pub fn get_or<T: for<'de> Deserialize<'de>>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Set a configuration value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value).map_err(|e| StorageSystemError::SerializationError {
            format: "json".to_string(),
            source: Box::new(e),
        })?;
        self.values.insert(key.to_string(), json_value);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Nested object stored under `key`, or an empty config
    pub fn section(&self, key: &str) -> ConfigData {
        self.values
            .get(key)
            .cloned()
            .map(ConfigData::from_value)
            .unwrap_or_default()
    }

    /// Read the whole config as a typed settings struct.
    pub fn parse<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        let value = serde_json::Value::Object(self.values.clone().into_iter().collect());
        serde_json::from_value(value).map_err(|e| StorageSystemError::DeserializationError {
            format: ConfigFormat::Json.extension().to_string(),
            source: Box::new(e),
        })
    }

    /// Merge with another config, overriding existing values
    pub fn merge(&mut self, other: &ConfigData) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Serialize to string based on format
    pub fn serialize(&self, format: ConfigFormat) -> Result<String> {
        let serialization_error = |source: Box<dyn std::error::Error + Send + Sync>| StorageSystemError::SerializationError {
            format: format.extension().to_string(),
            source,
        };
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(&self).map_err(|e| serialization_error(Box::new(e))),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(&self).map_err(|e| serialization_error(Box::new(e))),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(&self).map_err(|e| serialization_error(Box::new(e))),
        }
    }

    /// Deserialize from string based on format
    pub fn deserialize(data: &str, format: ConfigFormat) -> Result<Self> {
        let deserialization_error = |source: Box<dyn std::error::Error + Send + Sync>| StorageSystemError::DeserializationError {
            format: format.extension().to_string(),
            source,
        };
        match format {
            ConfigFormat::Json => serde_json::from_str(data).map_err(|e| deserialization_error(Box::new(e))),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(|e| deserialization_error(Box::new(e))),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data).map_err(|e| deserialization_error(Box::new(e))),
        }
    }

    /// Read a config file, picking the format from its extension.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| StorageSystemError::UnsupportedConfigFormat(path.display().to_string()))?;
        let content = fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageSystemError::FileNotFound(path.to_path_buf())
            } else {
                StorageSystemError::io(e, "read_config", path.to_path_buf())
            }
        })?;
        log::debug!("Loaded {} config from {}", format.extension(), path.display());
        Self::deserialize(&content, format)
    }
}

impl Default for ConfigData {
    fn default() -> Self {
        Self::new()
    }
}
