//! Configuration system
//!
//! `AudioConfig` can be stored as TOML or RON; the format is picked from the
//! file extension.

pub use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;
        
        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }
    
    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };
        
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    
    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
    
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),
    
    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value failed validation
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Name of the offending field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Audio engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Directory that relative asset paths are resolved against
    pub asset_root: PathBuf,
    /// Grace period after a preload before an idle device is torn down, in milliseconds
    pub idle_teardown_ms: u64,
    /// Whether the idle teardown monitor runs at all
    pub idle_teardown_enabled: bool,
    /// Gain given to the single voice created by `preload_fx`
    pub effect_gain: f32,
    /// Upper bound on the voice count accepted by `preload_audio`
    pub max_voices_per_asset: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("app/native"),
            idle_teardown_ms: 3000,
            idle_teardown_enabled: true,
            effect_gain: 1.0,
            max_voices_per_asset: 64,
        }
    }
}

impl Config for AudioConfig {}

impl AudioConfig {
    /// Set the asset root directory
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    /// Set the idle teardown delay
    pub fn with_idle_teardown(mut self, delay: Duration) -> Self {
        self.idle_teardown_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.idle_teardown_enabled = true;
        self
    }

    /// Disable the idle teardown monitor
    pub fn without_idle_teardown(mut self) -> Self {
        self.idle_teardown_enabled = false;
        self
    }

    /// Idle teardown delay as a `Duration`
    pub fn idle_teardown_delay(&self) -> Duration {
        Duration::from_millis(self.idle_teardown_ms)
    }

    /// Resolve an asset path against the asset root
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve_asset_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.asset_root.join(path)
        }
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.effect_gain.is_finite() || self.effect_gain < 0.0 {
            return Err(ConfigError::Invalid {
                field: "effect_gain",
                reason: format!("{} is not a non-negative gain", self.effect_gain),
            });
        }
        if self.max_voices_per_asset == 0 {
            return Err(ConfigError::Invalid {
                field: "max_voices_per_asset",
                reason: "must allow at least one voice".to_string(),
            });
        }
        if self.idle_teardown_enabled && self.idle_teardown_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "idle_teardown_ms",
                reason: "delay must be non-zero while teardown is enabled".to_string(),
            });
        }
        Ok(())
    }
}
