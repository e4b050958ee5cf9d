//! Engine configuration
//!
//! Defaults, optionally overlaid by a TOML file and then by `SCRAWL_*`
//! environment variables.

use scrawl_cache::{PoolConfig, TextureCacheConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::memory::MemoryThresholds;

const MIB: u64 = 1024 * 1024;

/// Surface pool section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSection {
    pub max_surfaces: usize,
    pub idle_ttl_secs: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_surfaces: 8,
            idle_ttl_secs: 60,
        }
    }
}

/// Texture cache section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextureSection {
    pub budget_mb: usize,
    pub max_age_secs: u64,
    pub load_timeout_ms: u64,
    /// Cache size to trim down to under high memory pressure
    pub trim_target_mb: usize,
    pub assets_dir: PathBuf,
}

impl Default for TextureSection {
    fn default() -> Self {
        Self {
            budget_mb: 128,
            max_age_secs: 300,
            load_timeout_ms: 3000,
            trim_target_mb: 32,
            assets_dir: PathBuf::from("assets/papers"),
        }
    }
}

/// Memory coordinator section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemorySection {
    pub cleanup_interval_secs: u64,
    pub pressure_interval_secs: u64,
    pub moderate: f64,
    pub high: f64,
    pub critical: f64,
    /// Overrides the physical memory size as the heap limit
    pub heap_limit_mb: Option<u64>,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 30,
            pressure_interval_secs: 5,
            moderate: 0.6,
            high: 0.75,
            critical: 0.9,
            heap_limit_mb: None,
        }
    }
}

/// Performance history sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerformanceSection {
    pub render_history: usize,
    pub memory_history: usize,
    pub frame_history: usize,
}

impl Default for PerformanceSection {
    fn default() -> Self {
        Self {
            render_history: 1000,
            memory_history: 500,
            frame_history: 500,
        }
    }
}

/// Configuration for a [`crate::Scrawl`] engine
///
/// Example file:
/// ```toml
/// [pool]
/// max_surfaces = 4
///
/// [textures]
/// budget_mb = 64
/// assets_dir = "/usr/share/scrawl/papers"
///
/// [memory]
/// heap_limit_mb = 2048
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub pool: PoolSection,
    pub textures: TextureSection,
    pub memory: MemorySection,
    pub performance: PerformanceSection,
}

impl EngineConfig {
    /// Sets the surface pool cap.
    pub fn with_max_surfaces(mut self, max_surfaces: usize) -> Self {
        self.pool.max_surfaces = max_surfaces;
        self
    }

    /// Sets the texture budget in megabytes.
    pub fn with_texture_budget_mb(mut self, mb: usize) -> Self {
        self.textures.budget_mb = mb;
        self
    }

    /// Sets the directory texture filenames are resolved against.
    pub fn with_assets_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.textures.assets_dir = path.as_ref().to_path_buf();
        self
    }

    /// Sets an explicit heap limit in megabytes.
    pub fn with_heap_limit_mb(mut self, mb: u64) -> Self {
        self.memory.heap_limit_mb = Some(mb);
        self
    }

    /// Loads defaults overridden by environment variables.
    ///
    /// Environment variables:
    /// - `SCRAWL_MAX_SURFACES`: surface pool cap
    /// - `SCRAWL_TEXTURE_BUDGET_MB`: texture cache budget in MB
    /// - `SCRAWL_ASSETS_DIR`: texture directory
    /// - `SCRAWL_HEAP_LIMIT_MB`: heap limit in MB
    ///
    /// # Errors
    /// Returns an error if any variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Applies `SCRAWL_*` environment overrides on top of this configuration.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(value) = env_parse::<usize>("SCRAWL_MAX_SURFACES")? {
            self.pool.max_surfaces = value;
        }
        if let Some(value) = env_parse::<usize>("SCRAWL_TEXTURE_BUDGET_MB")? {
            self.textures.budget_mb = value;
        }
        if let Ok(value) = std::env::var("SCRAWL_ASSETS_DIR") {
            self.textures.assets_dir = PathBuf::from(value);
        }
        if let Some(value) = env_parse::<u64>("SCRAWL_HEAP_LIMIT_MB")? {
            self.memory.heap_limit_mb = Some(value);
        }
        self.validate()?;
        Ok(self)
    }

    /// Loads configuration from a TOML file. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_surfaces == 0 {
            return Err(ConfigError::InvalidValue("pool.max_surfaces".into()));
        }
        if self.textures.load_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("textures.load_timeout_ms".into()));
        }
        if self.memory.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("memory.cleanup_interval_secs".into()));
        }
        if self.memory.pressure_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("memory.pressure_interval_secs".into()));
        }
        let m = &self.memory;
        let increasing = 0.0 < m.moderate && m.moderate < m.high && m.high < m.critical;
        if !increasing || m.critical > 1.0 {
            return Err(ConfigError::InvalidValue(
                "memory thresholds must increase within (0, 1]".into(),
            ));
        }
        let p = &self.performance;
        if p.render_history == 0 || p.memory_history == 0 || p.frame_history == 0 {
            return Err(ConfigError::InvalidValue("performance history sizes".into()));
        }
        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_surfaces: self.pool.max_surfaces,
            idle_ttl: Duration::from_secs(self.pool.idle_ttl_secs),
        }
    }

    pub fn texture_cache_config(&self) -> TextureCacheConfig {
        TextureCacheConfig {
            memory_limit: self.textures.budget_mb.saturating_mul(MIB as usize),
            load_timeout: Duration::from_millis(self.textures.load_timeout_ms),
        }
    }

    /// Heap ceiling in bytes; oversized values saturate
    pub fn heap_limit_bytes(&self) -> Option<u64> {
        self.memory.heap_limit_mb.map(|mb| mb.saturating_mul(MIB))
    }

    pub fn memory_thresholds(&self) -> MemoryThresholds {
        MemoryThresholds {
            moderate: self.memory.moderate,
            high: self.memory.high,
            critical: self.memory.critical,
        }
    }

    pub fn texture_max_age(&self) -> Duration {
        Duration::from_secs(self.textures.max_age_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.memory.cleanup_interval_secs)
    }

    pub fn pressure_interval(&self) -> Duration {
        Duration::from_secs(self.memory.pressure_interval_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    /// I/O error reading or writing configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
