//! Startup configuration for Delay Daemon
//!
//! Settings come from an optional TOML file, overridden by command line
//! flags, and are validated once before any device is touched.
//!
//! ## Config File Location
//!
//! `Config::load()` reads `~/.config/delay-daemon/config.toml` on Linux
//! (the platform config directory elsewhere).
//!
//! ## Example
//!
//! ```toml
//! [input]
//! device = "/dev/input/event3"
//!
//! [key]
//! min_ms = 50
//! max_ms = 150
//!
//! [movement]
//! min_ms = 0
//! max_ms = 0
//!
//! [distribution]
//! mode = "normal"
//! mean = 100.0
//! std = 20.0
//!
//! [reconfig]
//! fifo = "/tmp/delay_fifo"
//! ```

use crate::delay::{DelayParameters, Distribution};
use crate::engine::EventFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to determine config directory
    #[error("Could not determine config directory")]
    NoConfigDir,
    /// IO error reading or writing config file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Failed to parse config file
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Failed to serialize config
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// No input device was given
    #[error("No input device specified (e.g. --input /dev/input/event3)")]
    MissingDevice,
    /// Normal distribution mean outside the delay bounds
    #[error("Illegal value for mean ({0}). Average must be between min and max delay!")]
    MeanOutOfBounds(f64),
    /// Normal distribution std negative or not a number
    #[error("Illegal value for std ({0}). Must be a non-negative number")]
    InvalidStd(f64),
}

/// Returns the path to the config file. Nothing is created on disk.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(config_dir.join("delay-daemon").join("config.toml"))
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Physical input device
    #[serde(default)]
    pub input: InputConfig,
    /// Delay bounds for keys and clicks
    #[serde(default)]
    pub key: DelayRange,
    /// Delay bounds for relative movement
    #[serde(default)]
    pub movement: DelayRange,
    /// Delay distribution, shared by both classes
    #[serde(default)]
    pub distribution: DistributionConfig,
    /// Runtime reconfiguration
    #[serde(default)]
    pub reconfig: ReconfigConfig,
    /// Audit log output
    #[serde(default)]
    pub audit: AuditConfig,
    /// Extra event types to drop
    #[serde(default)]
    pub filter: FilterConfig,
}

/// Input device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Event device, e.g. `/dev/input/event3`
    pub device: Option<PathBuf>,
    /// Wait before grabbing, so that the Enter key used to start the
    /// daemon is released and not left stuck down
    pub settle_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device: None,
            settle_ms: 1000,
        }
    }
}

/// Delay bounds in milliseconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DelayRange {
    pub min_ms: u32,
    pub max_ms: u32,
}

impl DelayRange {
    pub fn new(min_ms: u32, max_ms: u32) -> Self {
        Self { min_ms, max_ms }
    }
}

/// Distribution settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DistributionConfig {
    pub mode: Distribution,
    /// Normal mode mean; defaults to the middle of the key range
    pub mean: Option<f64>,
    /// Normal mode std; defaults to a tenth of the mean
    pub std: Option<f64>,
}

/// Reconfiguration channel settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReconfigConfig {
    /// Named pipe to create; no runtime reconfiguration if unset
    pub fifo: Option<PathBuf>,
}

/// Audit log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Semicolon-separated event log, appended at shutdown
    pub log_file: PathBuf,
    /// Optional JSON session summary
    pub summary: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("event_log.csv"),
            summary: None,
        }
    }
}

/// Event filter settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FilterConfig {
    /// Kernel event types dropped in addition to `EV_SYN`
    pub drop_types: Vec<u16>,
}

impl Config {
    /// Load configuration from the default config file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific path, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    /// Fill in defaults and check the settings.
    ///
    /// - a minimum key delay without a maximum means a constant delay
    /// - each maximum is raised to its minimum
    /// - in normal mode the mean defaults to the middle of the key range
    ///   and the std to a tenth of the mean; the mean must lie within the
    ///   key range and the movement range (a movement maximum of 0 means no
    ///   movement delay and is not checked)
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.input.device.is_none() {
            return Err(ConfigError::MissingDevice);
        }

        if self.key.min_ms > 0 && self.key.max_ms == 0 {
            self.key.max_ms = self.key.min_ms;
        }
        for range in [&mut self.key, &mut self.movement] {
            range.max_ms = range.max_ms.max(range.min_ms);
        }

        if self.distribution.mode == Distribution::Normal {
            let mean = self.distribution.mean.unwrap_or_else(|| {
                ((u64::from(self.key.min_ms) + u64::from(self.key.max_ms)) / 2) as f64
            });
            let std = self.distribution.std.unwrap_or(mean / 10.0);

            let key_ok = mean >= f64::from(self.key.min_ms) && mean <= f64::from(self.key.max_ms);
            let move_ok = mean >= f64::from(self.movement.min_ms)
                && (self.movement.max_ms == 0 || mean <= f64::from(self.movement.max_ms));
            if !mean.is_finite() || !key_ok || !move_ok {
                return Err(ConfigError::MeanOutOfBounds(mean));
            }
            if !std.is_finite() || std < 0.0 {
                return Err(ConfigError::InvalidStd(std));
            }

            self.distribution.mean = Some(mean);
            self.distribution.std = Some(std);
        }

        Ok(self)
    }

    fn parameters(&self, range: DelayRange) -> DelayParameters {
        match self.distribution.mode {
            Distribution::Linear => DelayParameters::linear(range.min_ms, range.max_ms),
            Distribution::Normal => DelayParameters::normal(
                range.min_ms,
                range.max_ms,
                self.distribution.mean.unwrap_or_default(),
                self.distribution.std.unwrap_or_default(),
            ),
        }
    }

    /// Initial parameters for key and click events
    pub fn key_parameters(&self) -> DelayParameters {
        self.parameters(self.key)
    }

    /// Initial parameters for movement events
    pub fn movement_parameters(&self) -> DelayParameters {
        self.parameters(self.movement)
    }

    pub fn event_filter(&self) -> EventFilter {
        EventFilter::dropping(self.filter.drop_types.iter().copied())
    }

    /// Wait before grabbing the input device
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.input.settle_ms)
    }
}
