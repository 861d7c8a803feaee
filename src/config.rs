//!
//! 配置模块
//!

use std::fs;
use std::num::{NonZeroUsize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::marketplace::query::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

pub const DEFAULT_GALLERY_URL: &str = "https://marketplace.visualstudio.com/";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub marketplace: MarketplaceConfig,
    pub download: DownloadConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MarketplaceConfig {
    /// Gallery root; the query and package endpoints hang off it
    pub api_url: String,
    pub page_size: usize,
    pub max_results: usize,
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DownloadConfig {
    pub max_concurrent_downloads: usize,
    pub chunk_size: usize,
    pub progress_interval_ms: u64,
    pub download_dir: PathBuf,
}

impl Config {
    pub fn load_from_file(file_path: impl AsRef<Path>) -> Result<Self> {
        let file_path = file_path.as_ref();
        let config_data = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config: {}", file_path.display()))?;
        let config: Config = serde_json::from_str(&config_data)
            .with_context(|| format!("Failed to parse config: {}", file_path.display()))?;

        Ok(config)
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GALLERY_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_results: DEFAULT_PAGE_SIZE,
            request_timeout_secs: 10,
        }
    }
}

impl MarketplaceConfig {
    pub fn page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            chunk_size: 64 * 1024,
            progress_interval_ms: 100,
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

impl DownloadConfig {
    /// Number of transfer slots, at least one
    pub fn slots(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_concurrent_downloads).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn chunk_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.chunk_size).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use super::*;

    #[test]
    fn should_fill_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "download": {{ "max_concurrent_downloads": 5, "download_dir": "/tmp/vsix" }} }}"#).unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.download.max_concurrent_downloads, 5);
        assert_eq!(config.download.download_dir, PathBuf::from("/tmp/vsix"));
        assert_eq!(config.download.chunk_size, 64 * 1024);
        assert_eq!(config.marketplace, MarketplaceConfig::default());
    }

    #[test]
    fn should_reject_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = Config::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse config"));
        assert!(Config::load_from_file("/definitely/missing/config.json").is_err());
    }

    #[test]
    fn should_keep_limits_positive() {
        let config = DownloadConfig {
            max_concurrent_downloads: 0,
            chunk_size: 0,
            ..DownloadConfig::default()
        };
        assert_eq!(config.slots().get(), 1);
        assert_eq!(config.chunk_size().get(), 1);

        let marketplace = MarketplaceConfig { page_size: 5000, ..MarketplaceConfig::default() };
        assert_eq!(marketplace.page_size(), MAX_PAGE_SIZE);
    }
}
