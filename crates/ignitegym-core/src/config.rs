//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the backend URL, where the session is persisted, and the last email used
//! to sign in.
//!
//! Configuration is stored at `~/.config/ignitegym/config.json`. The
//! `IGNITEGYM_API_URL` environment variable overrides the configured URL.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::storage::{FileStore, KeyValueStore, KeyringStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "ignitegym";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the backend URL
pub const API_URL_ENV: &str = "IGNITEGYM_API_URL";

/// Backend URL when neither the environment nor the config sets one
pub const DEFAULT_API_URL: &str = "http://localhost:3333";

/// Where the session token pair and profile are persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    #[serde(default)]
    pub storage: StorageBackend,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Backend URL: environment, then config, then the default
    pub fn api_url(&self) -> String {
        resolve_api_url(std::env::var(API_URL_ENV).ok(), self.api_url.as_deref())
    }

    /// Open the configured durable store for session data
    pub fn open_store(&self) -> Result<Arc<dyn KeyValueStore>> {
        let store: Arc<dyn KeyValueStore> = match self.storage {
            StorageBackend::File => Arc::new(FileStore::new(self.data_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringStore::new(APP_NAME)),
        };
        Ok(store)
    }
}

fn resolve_api_url(from_env: Option<String>, configured: Option<&str>) -> String {
    from_env
        .filter(|url| !url.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_api_url_precedence() {
        assert_eq!(resolve_api_url(None, None), DEFAULT_API_URL);
        assert_eq!(
            resolve_api_url(None, Some("https://gym.example.com")),
            "https://gym.example.com"
        );
        assert_eq!(
            resolve_api_url(Some("http://10.0.0.2:3333".to_string()), Some("https://gym.example.com")),
            "http://10.0.0.2:3333"
        );
        assert_eq!(
            resolve_api_url(Some("  ".to_string()), Some("https://gym.example.com")),
            "https://gym.example.com"
        );
    }

    #[test]
    fn test_config_defaults_when_fields_missing() {
        let config: Config = serde_json::from_str("{}").expect("empty config should parse");
        assert_eq!(config.storage, StorageBackend::File);
        assert!(config.api_url.is_none());

        let config: Config =
            serde_json::from_str(r#"{"storage":"keyring","last_email":"a@x.com"}"#).expect("parse");
        assert_eq!(config.storage, StorageBackend::Keyring);
        assert_eq!(config.last_email.as_deref(), Some("a@x.com"));
    }
}
