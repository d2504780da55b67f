use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use backdrop::app::{App, AppOptions};
use backdrop::config::Config;
use backdrop::logging;

/// Backdrop - audio-reactive waves for your terminal
///
/// Loops a track and paints layered waves that follow its spectrum. Without
/// a track (or an output device) the waves keep breathing on their own.
#[derive(Parser, Debug)]
#[command(name = "backdrop")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Audio file to loop (mp3 or wav)
    audio: Option<PathBuf>,

    /// Initial volume (0.0-1.0)
    #[arg(long, default_value = "0.8")]
    volume: f32,

    /// Start playing immediately
    #[arg(long)]
    autoplay: bool,

    /// Frames per second (overrides the config file)
    #[arg(long)]
    fps: Option<u32>,

    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not tap the audio; waves follow play state only
    #[arg(long)]
    no_analysis: bool,

    /// Log filter directive, e.g. "debug" or "backdrop=trace"
    #[arg(long)]
    log_level: Option<String>,

    /// Log file path
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Restore the terminal before the panic message is printed.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = crossterm::terminal::disable_raw_mode();
        let _ = crossterm::execute!(
            std::io::stdout(),
            crossterm::terminal::LeaveAlternateScreen,
            crossterm::event::DisableMouseCapture
        );
        original_hook(panic_info);
    }));

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(fps) = args.fps {
        config.frame_rate = fps;
    }
    if let Some(level) = args.log_level {
        config.log.level = level;
    }
    if let Some(file) = args.log_file {
        config.log.file = Some(file);
    }
    config.validate().context("Invalid configuration")?;

    let _log_guard = logging::init(&config.log)?;

    let options = AppOptions {
        audio: args.audio,
        volume: args.volume.clamp(0.0, 1.0),
        autoplay: args.autoplay,
        analysis: !args.no_analysis,
    };

    let mut app = App::new(config, options)?;
    app.run()?;

    Ok(())
}
