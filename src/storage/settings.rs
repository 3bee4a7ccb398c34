//! Settings storage
//!
//! Persists the translator configuration as JSON in the data directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::{get_data_dir, StorageError};
use crate::types::config::TranslatorConfig;

/// Get the settings file path
fn get_settings_path() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("settings.json"))
}

/// Load the configuration from the data directory
///
/// Returns defaults if the file doesn't exist or is corrupted
pub fn load_config() -> TranslatorConfig {
    let loaded = get_settings_path().and_then(|path| load_config_from(&path));
    match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            TranslatorConfig::default()
        }
    }
}

/// Load and validate a configuration file. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<TranslatorConfig, StorageError> {
    if !path.exists() {
        tracing::info!("Settings file not found, using defaults");
        return Ok(TranslatorConfig::default());
    }

    let json = fs::read_to_string(path)?;
    let mut config: TranslatorConfig = serde_json::from_str(&json)?;
    config.validate();

    tracing::debug!("Loaded settings from {:?}", path);
    Ok(config)
}

/// Save the configuration to the data directory
pub fn save_config(config: &TranslatorConfig) -> Result<(), StorageError> {
    save_config_to(&get_settings_path()?, config)
}

pub fn save_config_to(path: &Path, config: &TranslatorConfig) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;

    tracing::debug!("Saved settings to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("settings.json")).unwrap();
        assert_eq!(config, TranslatorConfig::default());
    }

    #[test]
    fn test_settings_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let config = TranslatorConfig {
            temperature: 0.4,
            max_tokens: 128,
            ..TranslatorConfig::default()
        };
        save_config_to(&path, &config).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_loaded_settings_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"temperature": 7.5, "top_p": 3.0}"#).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.temperature, 2.0);
        assert_eq!(loaded.top_p, 1.0);
    }

    #[test]
    fn test_corrupted_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(load_config_from(&path), Err(StorageError::Json(_))));
    }
}
