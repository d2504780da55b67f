//! Main application state and event loop.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{debug, info, warn};

use crate::audio::{AudioDecoder, AudioPlayer, AudioSource, SharedSource, TapKind};
use crate::config::Config;
use crate::ui::render::render_ui;
use crate::ui::surface::{Scene, Surface, SurfaceSize, TerminalSurface};
use crate::visualizer::{BackgroundVisualizer, MountStatus};

/// Event poll timeout when no frame is scheduled.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Command-line choices that shape the session.
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Track to loop behind the waves
    pub audio: Option<PathBuf>,
    pub volume: f32,
    pub autoplay: bool,
    /// Tap the playing audio for the spectrum
    pub analysis: bool,
}

/// Main application state.
pub struct App {
    /// Audio player; `None` in visual-only mode
    player: Option<AudioPlayer>,
    decoder: AudioDecoder,
    visualizer: BackgroundVisualizer<TerminalSurface>,
    options: AppOptions,
    /// Play state when there is no player
    idle_playing: bool,
    running: bool,
    terminal_gain: f64,
}

impl App {
    pub fn new(config: Config, options: AppOptions) -> Result<Self> {
        let player = match &options.audio {
            Some(_) => match AudioPlayer::new() {
                Ok(mut player) => {
                    player.set_volume(options.volume);
                    Some(player)
                }
                Err(e) => {
                    warn!(error = %e, "no audio output, running visual-only");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            player,
            decoder: AudioDecoder::new(),
            terminal_gain: config.waves.terminal_gain,
            visualizer: BackgroundVisualizer::new(TerminalSurface::default(), config),
            idle_playing: options.autoplay,
            options,
            running: true,
        })
    }

    pub fn scene(&self) -> &Scene {
        self.visualizer.surface().scene()
    }

    pub fn surface_size(&self) -> SurfaceSize {
        self.visualizer.surface().device_size()
    }

    pub fn terminal_gain(&self) -> f64 {
        self.terminal_gain
    }

    pub fn has_playback(&self) -> bool {
        self.player.is_some()
    }

    pub fn is_playing(&self) -> bool {
        match &self.player {
            Some(player) => player.is_playing(),
            None => self.idle_playing,
        }
    }

    pub fn is_muted(&self) -> bool {
        self.player.as_ref().is_some_and(|p| p.is_muted())
    }

    pub fn volume(&self) -> f32 {
        self.player.as_ref().map(|p| p.volume()).unwrap_or(0.0)
    }

    pub fn track_name(&self) -> String {
        match (&self.player, &self.options.audio) {
            (Some(_), Some(path)) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            _ => "visual only".to_string(),
        }
    }

    /// Playback position as `mm:ss`.
    pub fn position_label(&self) -> String {
        let secs = self
            .player
            .as_ref()
            .map(|p| p.handle().position().as_secs())
            .unwrap_or(0);
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }

    pub fn analysis_label(&self) -> &'static str {
        match self.visualizer.analyzer().tap_kind() {
            Some(TapKind::Real) => "live spectrum",
            Some(TapKind::Synthetic) => "synthetic spectrum",
            None => "idle waves",
        }
    }

    /// Start the output stream and the looping decoder.
    fn start_playback(&mut self) -> Result<()> {
        let (Some(player), Some(path)) = (self.player.as_mut(), self.options.audio.as_ref()) else {
            return Ok(());
        };
        let producer = player.init_buffer()?;
        self.decoder
            .start(path, producer, player.decoder_flags())
            .context("Failed to start decoder")?;
        if self.options.autoplay {
            player.set_playing(true);
        }
        info!(path = %path.display(), "playback started");
        Ok(())
    }

    /// Source handed to the visualizer, if analysis is wanted.
    fn analysis_source(&self) -> Option<SharedSource> {
        if !self.options.analysis {
            return None;
        }
        self.player.as_ref().map(|p| {
            let handle: SharedSource = Arc::new(p.handle());
            handle
        })
    }

    fn mount_visualizer(&mut self) -> MountStatus {
        let source = self.analysis_source();
        self.visualizer.mount(source, Instant::now())
    }

    /// Handle key events.
    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.running = false;
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.running = false;
            }
            KeyCode::Char(' ') => match &self.player {
                Some(player) => {
                    player.toggle_pause();
                }
                None => self.idle_playing = !self.idle_playing,
            },
            KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Char(']') | KeyCode::Up => {
                if let Some(player) = self.player.as_mut() {
                    player.volume_up();
                }
            }
            KeyCode::Char('-') | KeyCode::Char('_') | KeyCode::Char('[') | KeyCode::Down => {
                if let Some(player) = self.player.as_mut() {
                    player.volume_down();
                }
            }
            KeyCode::Char('m') => {
                if let Some(player) = self.player.as_mut() {
                    let muted = player.toggle_mute();
                    debug!(muted, "mute toggled");
                }
            }
            _ => {}
        }
    }

    fn handle_resize(&mut self, cols: u16, rows: u16) {
        self.visualizer.resize(SurfaceSize::from_cells(cols, rows));
        // A surface that had no context gets a fresh mount once it has area.
        if self.visualizer.status() == Some(MountStatus::Inert) {
            self.mount_visualizer();
        }
    }

    /// Run the application.
    pub fn run(&mut self) -> Result<()> {
        if let Err(e) = self.start_playback() {
            warn!(error = %format!("{e:#}"), "playback unavailable, running visual-only");
            self.decoder.stop();
            self.player = None;
        }

        // Setup terminal with cleanup guard
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = crossterm::terminal::size()
            .map_err(anyhow::Error::from)
            .and_then(|(cols, rows)| {
                self.visualizer.resize(SurfaceSize::from_cells(cols, rows));
                self.mount_visualizer();
                self.run_loop(&mut terminal)
            });

        // Release the analysis tap before the stream it reads from.
        self.visualizer.unmount();
        self.decoder.stop();
        if let Some(player) = self.player.as_mut() {
            player.stop();
        }

        // Cleanup terminal (always do this, even if loop errored)
        let _ = disable_raw_mode();
        let _ = execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        );
        let _ = terminal.show_cursor();

        result
    }

    /// Main event loop - separated for easier cleanup handling.
    fn run_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        while self.running {
            let timeout = self
                .visualizer
                .time_until_next_frame(Instant::now())
                .unwrap_or(IDLE_POLL);

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        self.handle_key(key.code, key.modifiers);
                    }
                    Event::Resize(cols, rows) => self.handle_resize(cols, rows),
                    _ => {}
                }
            }

            let playing = self.is_playing();
            if self.visualizer.on_frame(Instant::now(), playing).is_some() {
                terminal.draw(|f| render_ui(f, self))?;
            }
        }

        Ok(())
    }
}
