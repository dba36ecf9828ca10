//! Configuration Module
//!
//! Centralized configuration for rpki-rp: TAL selection, cache and
//! output locations, enabled output formats, and fetch limits.

use crate::error::{Result, RpkiError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default location of the local object cache
pub const DEFAULT_CACHE_DIR: &str = "/var/cache/rpki-client";

/// Default location for the generated output files
pub const DEFAULT_OUTPUT_DIR: &str = "/var/db/rpki-client";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// TAL files bootstrapping the run
    pub tals: Vec<PathBuf>,

    /// Base directory of the local object cache
    pub cache_dir: PathBuf,

    /// Directory the output files are written into
    pub output_dir: PathBuf,

    /// Output formats to produce
    pub formats: OutputFormats,

    /// Fetch limits and transport switches
    pub fetch: FetchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tals: Vec::new(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            formats: OutputFormats::default(),
            fetch: FetchConfig::default(),
        }
    }
}

/// Enabled output formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OutputFormats {
    /// OpenBGPD roa-set
    pub openbgpd: bool,

    /// BIRD v2 roa table
    pub bird: bool,

    /// Comma-separated values
    pub csv: bool,

    /// JSON document
    pub json: bool,
}

impl Default for OutputFormats {
    fn default() -> Self {
        Self {
            openbgpd: true,
            bird: false,
            csv: false,
            json: false,
        }
    }
}

impl OutputFormats {
    /// Whether at least one format is enabled
    pub fn any(&self) -> bool {
        self.openbgpd || self.bird || self.csv || self.json
    }
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Use RRDP when a repository advertises a notification URI
    pub rrdp: bool,

    /// Wall-clock limit for a single repository fetch, in seconds
    pub timeout_secs: u64,

    /// Path of the rsync executable
    pub rsync_command: String,

    /// User-Agent sent on HTTP requests
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            rrdp: true,
            timeout_secs: 300,
            rsync_command: "rsync".to_string(),
            user_agent: format!("rpki-rp/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| RpkiError::Configuration(e.to_string()))?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tals.is_empty() {
            return Err(RpkiError::Configuration(
                "at least one TAL file is required".to_string(),
            ));
        }

        for tal in &self.tals {
            if !tal.exists() {
                return Err(RpkiError::Configuration(format!(
                    "TAL file not found: {}",
                    tal.display()
                )));
            }
        }

        if !self.formats.any() {
            return Err(RpkiError::Configuration(
                "no output format enabled".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
        assert_eq!(config.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert!(config.formats.openbgpd);
        assert!(config.fetch.rrdp);
    }

    #[test]
    fn test_validate_requires_tals() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.tals.push(PathBuf::from("/etc/rpki/arin.tal"));
        config.formats.csv = true;

        let text = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.tals, config.tals);
        assert!(back.formats.csv);
    }
}
