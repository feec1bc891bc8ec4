//! Engine configuration

use std::path::Path;
use std::time::Duration;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration handed to the composition root
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Column mapping store settings
    pub column_mappings: ColumnMappingSettings,
}

/// Persistence settings for the column mapping store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnMappingSettings {
    /// Key the mappings are stored under in the async stores
    pub storage_key: String,

    /// Key the mappings were stored under in the legacy synchronous store
    pub legacy_key: String,

    /// Save/notify coalescing window in milliseconds
    pub debounce_ms: u64,
}

impl Default for ColumnMappingSettings {
    fn default() -> Self {
        Self {
            storage_key: "columnMappings".to_string(),
            legacy_key: "columnMappings".to_string(),
            debounce_ms: 100,
        }
    }
}

impl ColumnMappingSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl EngineConfig {
    /// Parse from JSON text; missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mappings = &self.column_mappings;
        if mappings.storage_key.is_empty() {
            return Err(ConfigError::Invalid("columnMappings.storageKey is empty".into()));
        }
        if mappings.legacy_key.is_empty() {
            return Err(ConfigError::Invalid("columnMappings.legacyKey is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = EngineConfig::from_json(r#"{"columnMappings": {"debounceMs": 250}}"#).unwrap();
        assert_eq!(config.column_mappings.debounce(), Duration::from_millis(250));
        assert_eq!(config.column_mappings.storage_key, "columnMappings");

        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_rejects_empty_key() {
        let err = EngineConfig::from_json(r#"{"columnMappings": {"storageKey": ""}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EngineConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[tokio::test]
    async fn test_load_missing_file_has_context() {
        let err = EngineConfig::load("/nonexistent/engine.json").await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
