//! Configuration management (`config.toml`)
//!
//! Handles loading, saving, and providing defaults for engine settings.
//! Settings are stored in TOML format in the platform-specific config directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::demo::DesyncPolicy;

/// Errors from reading or writing an explicit config file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Engine configuration.
///
/// Contains all user-configurable settings organized into sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Tick pacing
    #[serde(default)]
    pub timing: TimingConfig,
    /// Demo recording and playback
    #[serde(default)]
    pub demo: DemoConfig,
    /// Registry side effects
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Tick pacing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Milliseconds per simulation tick (default: 10)
    #[serde(default = "default_frame_time")]
    pub frame_time_ms: u32,
    /// Simulation speed multiplier (default: 1.0)
    #[serde(default = "default_rate_multiplier")]
    pub rate_multiplier: f64,
    /// Upper bound on owed time after a stall (default: 200)
    #[serde(default = "default_max_accumulator")]
    pub max_accumulator_ms: f64,
    /// Pace ticks off the display refresh instead of the tick length
    #[serde(default)]
    pub vsync_updates: bool,
    /// Whether a windowed display waits for vsync (default: true)
    #[serde(default = "default_true")]
    pub wait_for_vsync: bool,
    /// Whether that wait is emulated in software (default: true)
    #[serde(default = "default_true")]
    pub soft_vsync_wait: bool,
    /// Draws per second guaranteed at normal speed (default: 10)
    #[serde(default = "default_min_draws")]
    pub min_draws_per_second: u32,
}

/// Demo configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// File name prefix for numbered recordings (default: "demo")
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Directory for recordings (default: platform data dir)
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Numbered recordings kept by `-recnum` (default: 5)
    #[serde(default = "default_keep")]
    pub keep_recordings: u32,
    /// What replay does on divergence (default: fatal)
    #[serde(default)]
    pub desync_policy: DesyncPolicy,
    /// Identity written into recordings and checked on replay
    #[serde(default = "default_product_version")]
    pub product_version: String,
}

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    /// Application key under `SOFTWARE`; empty disables the registry
    #[serde(default)]
    pub root: String,
    /// TOML file backing the registry (default: in memory)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_frame_time() -> u32 {
    10
}
fn default_rate_multiplier() -> f64 {
    1.0
}
fn default_max_accumulator() -> f64 {
    200.0
}
fn default_min_draws() -> u32 {
    10
}
fn default_true() -> bool {
    true
}

fn default_prefix() -> String {
    "demo".to_string()
}
fn default_keep() -> u32 {
    crate::demo::rotation::DEFAULT_KEEP
}
fn default_product_version() -> String {
    concat!("tickreel ", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            frame_time_ms: default_frame_time(),
            rate_multiplier: default_rate_multiplier(),
            max_accumulator_ms: default_max_accumulator(),
            vsync_updates: false,
            wait_for_vsync: default_true(),
            soft_vsync_wait: default_true(),
            min_draws_per_second: default_min_draws(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            directory: None,
            keep_recordings: default_keep(),
            desync_policy: DesyncPolicy::default(),
            product_version: default_product_version(),
        }
    }
}

impl DemoConfig {
    /// Configured directory, else the platform data dir, else the working dir
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .or_else(|| data_dir().map(|dir| dir.join("demos")))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("io.tickreel", "", "Tickreel")
}

/// Returns the platform-specific configuration directory.
///
/// On Windows: `%APPDATA%\Tickreel\config`
/// On macOS: `~/Library/Application Support/io.tickreel.Tickreel`
/// On Linux: `~/.config/Tickreel`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Returns the platform-specific data directory (recordings, registry file).
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Loads the configuration from disk.
///
/// Reads `config.toml` from the platform's configuration directory.
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> Config {
    let Some(path) = config_dir().map(|dir| dir.join("config.toml")) else {
        return Config::default();
    };
    if !path.exists() {
        return Config::default();
    }
    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Loads a specific config file
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Saves the configuration to the platform's configuration directory.
///
/// Creates the directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = config_dir() {
        save_to(config, &dir.join("config.toml"))?;
    }
    Ok(())
}

/// Saves the configuration to a specific file
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
