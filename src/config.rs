use crate::constants::{DEFAULT_AD_LIBRARY_URL, DEFAULT_TOP_N};
use crate::error::{RankerError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of rows in the top-ads report
    pub top_n: usize,
    /// Root directory holding raw, transformed, report and validation artifacts
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Derive fields on the rayon pool instead of sequentially
    pub parallel_derive: bool,
    /// Base URL used to build `ad_link` when the source omits it
    pub ad_library_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            parallel_derive: true,
            ad_library_url: DEFAULT_AD_LIBRARY_URL.to_string(),
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            RankerError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&config_content)
    }

    /// Load the file when it exists, otherwise fall back to defaults
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(RankerError::Config("top_n must be at least 1".to_string()));
        }
        if self.ad_library_url.trim().is_empty() {
            return Err(RankerError::Config("ad_library_url must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::from_toml_str("top_n = 25\nparallel_derive = false\n").unwrap();
        assert_eq!(config.top_n, 25);
        assert!(!config.parallel_derive);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.ad_library_url, DEFAULT_AD_LIBRARY_URL);
    }

    #[test]
    fn test_zero_top_n_rejected() {
        let err = Config::from_toml_str("top_n = 0").unwrap_err();
        assert!(matches!(err, RankerError::Config(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default(Path::new("/nonexistent/ad_ranker.toml")).unwrap();
        assert_eq!(config.top_n, DEFAULT_TOP_N);
    }
}
