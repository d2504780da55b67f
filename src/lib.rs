//! Backdrop - an audio-reactive wave backdrop for the terminal.
//!
//! A spectrum analyzer taps the playing track (or synthesizes a spectrum when
//! it cannot), and a layered wave renderer paints one frame per display tick
//! behind a small playback status line.

pub mod app;
pub mod audio;
pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod ui;
pub mod visualizer;

pub use audio::{AudioSnapshot, AudioSource, AudioTap, SharedSource, SourceId, SpectrumAnalyzer};
pub use config::Config;
pub use error::{AudioGraphError, ConfigError, SurfaceError};
pub use scheduler::{FrameScheduler, TickToken};
pub use visualizer::{BackgroundVisualizer, MountStatus};
