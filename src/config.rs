//! Configuration: an optional TOML file layered under the CLI arguments.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::ConfigError;

/// Name of the config file looked up in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Most wave layers that still get a positive alpha.
pub const MAX_LAYERS: usize = 7;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Display refresh rate driving the render loop
    pub frame_rate: u32,
    pub waves: WaveConfig,
    pub analyzer: AnalyzerConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            waves: WaveConfig::default(),
            analyzer: AnalyzerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Visual tuning for the wave renderer.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WaveConfig {
    pub layers: usize,
    pub base_frequency: f64,
    pub frequency_step: f64,
    pub base_speed: f64,
    pub speed_step: f64,
    pub amplitude_base: f64,
    pub amplitude_step: f64,
    /// Device pixels between horizontal samples
    pub sample_spacing: f64,
    pub phase_step_playing: f64,
    pub phase_step_idle: f64,
    /// Minimum volume before particles appear
    pub particle_threshold: f64,
    pub particle_scale: f64,
    /// Multiplier applied to alpha when compositing onto the terminal
    pub terminal_gain: f64,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            layers: 5,
            base_frequency: 0.01,
            frequency_step: 0.003,
            base_speed: 0.03,
            speed_step: 0.008,
            amplitude_base: 0.3,
            amplitude_step: 0.1,
            sample_spacing: 8.0,
            phase_step_playing: 0.05,
            phase_step_idle: 0.02,
            particle_threshold: 0.1,
            particle_scale: 15.0,
            terminal_gain: 4.0,
        }
    }
}

/// Spectrum analysis settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Number of frequency bins per snapshot (FFT size is twice this)
    pub bin_count: usize,
    /// Temporal smoothing constant in [0, 1)
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    /// Attenuation applied to synthetic spectra while paused
    pub idle_attenuation: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            bin_count: 128,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            idle_attenuation: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub enabled: bool,
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Log file path; defaults to the platform data directory
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load from an explicit path, or from the platform config directory if a
    /// file exists there, or fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=240).contains(&self.frame_rate) {
            return Err(ConfigError::Invalid(format!(
                "frame_rate must be within 1..=240, got {}",
                self.frame_rate
            )));
        }
        if self.analyzer.bin_count == 0 {
            return Err(ConfigError::Invalid("analyzer.bin_count must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.analyzer.smoothing) {
            return Err(ConfigError::Invalid(
                "analyzer.smoothing must be within [0, 1)".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.analyzer.idle_attenuation) {
            return Err(ConfigError::Invalid(
                "analyzer.idle_attenuation must be within [0, 1)".into(),
            ));
        }
        if self.analyzer.min_decibels >= self.analyzer.max_decibels {
            return Err(ConfigError::Invalid(
                "analyzer.min_decibels must be below max_decibels".into(),
            ));
        }
        // Layer alpha and line width shrink per layer and must stay positive.
        if !(1..=MAX_LAYERS).contains(&self.waves.layers) {
            return Err(ConfigError::Invalid(format!(
                "waves.layers must be within 1..={MAX_LAYERS}, got {}",
                self.waves.layers
            )));
        }
        if self.waves.sample_spacing <= 0.0 {
            return Err(ConfigError::Invalid("waves.sample_spacing must be positive".into()));
        }
        if self.waves.phase_step_playing <= 0.0 || self.waves.phase_step_idle <= 0.0 {
            return Err(ConfigError::Invalid("waves phase steps must be positive".into()));
        }
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "backdrop")
}

/// Platform config file location, e.g. `~/.config/backdrop/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Platform log file location.
pub fn default_log_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_local_dir().join("logs").join("backdrop.log"))
}
