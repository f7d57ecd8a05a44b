//! Clone configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default chunk size (4 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Configuration for clone operations.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct CloneConfig {
    /// Bytes transferred per chunk.
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    pub chunk_size: u64,

    /// Wait between chunks in milliseconds (0 for real devices).
    #[builder(default = "0")]
    pub chunk_delay_ms: u64,

    /// Warn when a single chunk takes longer than this.
    #[builder(default)]
    pub slow_chunk_threshold_ms: Option<u64>,

    /// Capacity of the event broadcast channel.
    #[builder(default = "DEFAULT_EVENT_CAPACITY")]
    pub event_capacity: usize,

    /// Directory for exported session logs (None = platform default).
    #[builder(default)]
    pub log_dir: Option<PathBuf>,
}

impl CloneConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.chunk_size == Some(0) {
            return Err("Chunk size must be greater than zero".to_string());
        }
        if self.event_capacity == Some(0) {
            return Err("Event capacity must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl CloneConfig {
    /// Create a new clone config builder.
    pub fn builder() -> CloneConfigBuilder {
        CloneConfigBuilder::default()
    }

    /// Wait between chunks.
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    /// Threshold for slow chunk warnings.
    pub fn slow_chunk_threshold(&self) -> Option<Duration> {
        self.slow_chunk_threshold_ms.map(Duration::from_millis)
    }

    /// Check value ranges of a config that did not go through the builder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                message: "chunk_size must be greater than zero".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "event_capacity must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Load a config from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load the config from `path`, or from the default location if it exists.
    ///
    /// Returns the default config when no path is given and no file exists.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay_ms: 0,
            slow_chunk_threshold_ms: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            log_dir: None,
        }
    }
}

/// Default config file location (`<config dir>/diskcloner/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("diskcloner").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_builder() {
        let config = CloneConfig::builder()
            .chunk_size(100u64)
            .chunk_delay_ms(5u64)
            .build()
            .unwrap();

        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.chunk_delay(), Duration::from_millis(5));
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert!(config.slow_chunk_threshold().is_none());
    }

    #[test]
    fn test_config_builder_rejects_zero_chunk() {
        assert!(CloneConfig::builder().chunk_size(0u64).build().is_err());
    }

    #[test]
    fn test_load_partial_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "chunk_size = 65536\nslow_chunk_threshold_ms = 2000\n").unwrap();

        let config = CloneConfig::load(&path).unwrap();
        assert_eq!(config.chunk_size, 65536);
        assert_eq!(config.slow_chunk_threshold(), Some(Duration::from_secs(2)));
        assert_eq!(config.chunk_delay_ms, 0);
    }

    #[test]
    fn test_load_invalid_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "chunk_size = 0\n").unwrap();
        assert!(matches!(
            CloneConfig::load(&path),
            Err(ConfigError::Invalid { .. })
        ));

        std::fs::write(&path, "chunk_size = \"big\"\n").unwrap();
        assert!(matches!(
            CloneConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = CloneConfig::load(&temp.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
