use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{FilmshelfError, Result};

/// Top-level configuration for Filmshelf.
///
/// Loaded from `~/.filmshelf/config.toml` by default. Every section is
/// optional and falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilmshelfConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
}

impl FilmshelfConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FilmshelfConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| FilmshelfError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.filmshelf/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Upstream metadata provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the provider (query parameters are appended).
    pub base_url: String,
    /// Access key sent as `apikey`. Usually supplied via `FILMSHELF_API_KEY`.
    pub api_key: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Request the long plot on detail lookups.
    pub full_plot: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.omdbapi.com/".to_string(),
            api_key: String::new(),
            timeout_secs: 15,
            user_agent: concat!("filmshelf/", env!("CARGO_PKG_VERSION")).to_string(),
            full_plot: false,
        }
    }
}

/// Metadata cache behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Days after which a persisted record is considered stale.
    pub freshness_days: i64,
    /// Maximum session cache entries. 0 means unbounded.
    pub session_capacity: usize,
    /// Share one upstream fetch between concurrent misses for the same id.
    pub coalesce_requests: bool,
    /// Return a stale record when a refresh fails with a retryable error.
    pub serve_stale_on_error: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_days: crate::types::FRESHNESS_HORIZON_DAYS,
            session_capacity: 0,
            coalesce_requests: true,
            serve_stale_on_error: false,
        }
    }
}

/// Collection behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Pre-fetch metadata when an entry is added.
    pub warm_on_add: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self { warm_on_add: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = FilmshelfConfig::default();
        assert_eq!(config.general.data_dir, "~/.filmshelf/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.provider.base_url, "https://www.omdbapi.com/");
        assert!(config.provider.api_key.is_empty());
        assert_eq!(config.cache.freshness_days, 30);
        assert_eq!(config.cache.session_capacity, 0);
        assert!(config.cache.coalesce_requests);
        assert!(!config.cache.serve_stale_on_error);
        assert!(config.collection.warm_on_add);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
data_dir = "/custom/data"
log_level = "debug"

[provider]
api_key = "abc123"
timeout_secs = 5

[cache]
freshness_days = 7
session_capacity = 500
serve_stale_on_error = true
"#;
        let file = create_temp_config(content);
        let config = FilmshelfConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "/custom/data");
        assert_eq!(config.provider.api_key, "abc123");
        assert_eq!(config.provider.timeout_secs, 5);
        assert_eq!(config.cache.freshness_days, 7);
        assert_eq!(config.cache.session_capacity, 500);
        assert!(config.cache.serve_stale_on_error);
        // Untouched fields keep their defaults.
        assert!(config.cache.coalesce_requests);
        assert!(config.collection.warm_on_add);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[general]\nlog_level = \"warn\"\n");
        let config = FilmshelfConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.provider.timeout_secs, 15);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = FilmshelfConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.filmshelf/data");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[cache\nfreshness_days = ");
        let err = FilmshelfConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, FilmshelfError::Config(_)));
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = FilmshelfConfig::default();
        config.cache.freshness_days = 14;
        config.save(&path).unwrap();

        let reloaded = FilmshelfConfig::load(&path).unwrap();
        assert_eq!(reloaded.cache.freshness_days, 14);
        assert_eq!(reloaded.provider.base_url, config.provider.base_url);
    }
}
