//! Core configuration.
//!
//! Configuration is stored at `~/.config/widgetsync/config.json`. Every
//! field has a default, so a missing file or a partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::api::transport::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::store::{ttl_seconds, StoreKeys, DEFAULT_KEY_PREFIX};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "widgetsync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// How long a processing/loading marker holds other instances off.
pub const DEFAULT_LOCK_TTL_SECS: i64 = 3 * 60;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/public";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub key_prefix: String,
    pub lock_ttl_secs: i64,
    pub bearer_token: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
            bearer_token: None,
        }
    }
}

impl CoreConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
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

    /// Directory for the persistent store.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn lock_ttl(&self) -> Duration {
        ttl_seconds(self.lock_ttl_secs)
    }

    pub fn request_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.request_timeout_secs)
    }

    pub fn store_keys(&self) -> StoreKeys {
        StoreKeys::new(self.key_prefix.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.lock_ttl(), Duration::minutes(3));
        assert_eq!(config.request_timeout(), StdDuration::from_secs(30));
        assert_eq!(config.store_keys().account_data(), "WIDGETSYNC_ACCOUNT_DATA");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"key_prefix": "ACME", "lock_ttl_secs": 60}"#).unwrap();

        let config = CoreConfig::load_from(&path).unwrap();
        assert_eq!(config.key_prefix, "ACME");
        assert_eq!(config.lock_ttl(), Duration::minutes(1));
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = CoreConfig {
            bearer_token: Some("tok".into()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(CoreConfig::load_from(&path).unwrap(), config);
    }
}
