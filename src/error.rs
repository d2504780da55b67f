//! Error types for the visualizer core and its configuration.
//!
//! None of these are fatal: the analyzer falls back to synthetic data and the
//! renderer skips painting. Only the application edges wrap them in `anyhow`.

use std::path::PathBuf;

use thiserror::Error;

/// The platform audio graph could not be tapped for analysis.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioGraphError {
    #[error("audio graph unavailable: {0}")]
    Unavailable(String),
    #[error("audio graph is suspended and could not be resumed")]
    Suspended,
}

/// A drawing context could not be acquired for the surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("surface context unavailable for a {width}x{height} surface")]
    ContextUnavailable { width: u32, height: u32 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}
