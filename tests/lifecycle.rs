//! Mount, tick and unmount cycles against a recording surface and a fake source.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use backdrop::audio::TapKind;
use backdrop::ui::surface::{DrawContext, Gradient, Rgba, Surface, SurfaceSize};
use backdrop::{
    AudioGraphError, AudioSource, AudioTap, BackgroundVisualizer, Config, MountStatus, SharedSource,
    SourceId, SurfaceError,
};
use ringbuf::{traits::*, HeapRb};

/// Counts drawing calls instead of drawing.
#[derive(Default)]
struct RecordingContext {
    clears: usize,
    strokes: usize,
    dots: usize,
}

impl DrawContext for RecordingContext {
    fn clear(&mut self) {
        self.clears += 1;
    }

    fn stroke_path(&mut self, _points: &[(f64, f64)], _gradient: &Gradient, _line_width: f64) {
        self.strokes += 1;
    }

    fn fill_circle(&mut self, _x: f64, _y: f64, _radius: f64, _color: Rgba) {
        self.dots += 1;
    }
}

struct RecordingSurface {
    size: SurfaceSize,
    available: Arc<AtomicBool>,
    ctx: RecordingContext,
}

impl RecordingSurface {
    fn new(width: u32, height: u32) -> Self {
        Self {
            size: SurfaceSize::new(width, height),
            available: Arc::new(AtomicBool::new(true)),
            ctx: RecordingContext::default(),
        }
    }
}

impl Surface for RecordingSurface {
    fn device_size(&self) -> SurfaceSize {
        self.size
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.size = size;
    }

    fn context(&mut self) -> Result<&mut dyn DrawContext, SurfaceError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SurfaceError::ContextUnavailable {
                width: self.size.width,
                height: self.size.height,
            });
        }
        Ok(&mut self.ctx)
    }
}

struct FakeSource {
    id: SourceId,
    playing: AtomicBool,
    fail: bool,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
    producer: Mutex<Option<ringbuf::HeapProd<f32>>>,
}

impl FakeSource {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId::next(),
            playing: AtomicBool::new(true),
            fail,
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            producer: Mutex::new(None),
        })
    }
}

impl AudioSource for FakeSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn volume(&self) -> f32 {
        0.8
    }

    fn position(&self) -> Duration {
        Duration::ZERO
    }

    fn open_tap(&self) -> Result<AudioTap, AudioGraphError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AudioGraphError::Unavailable("permission denied".into()));
        }
        let (producer, consumer) = HeapRb::<f32>::new(4096).split();
        *self.producer.lock().unwrap() = Some(producer);
        let released = Arc::clone(&self.released);
        Ok(AudioTap::new(consumer, 2, 44100).on_release(move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

fn visualizer(surface: RecordingSurface) -> BackgroundVisualizer<RecordingSurface> {
    BackgroundVisualizer::new(surface, Config::default()).with_particle_seed(42)
}

/// Advance simulated display refreshes and count paints.
fn run_frames(
    viz: &mut BackgroundVisualizer<RecordingSurface>,
    start: Instant,
    frames: u32,
    playing: bool,
) -> usize {
    let step = Duration::from_millis(40);
    (1..=frames)
        .filter(|&i| viz.on_frame(start + step * i, playing).is_some())
        .count()
}

#[test]
fn unmount_before_first_tick_leaves_nothing_pending() {
    let t0 = Instant::now();
    let source = FakeSource::new(false);
    let mut viz = visualizer(RecordingSurface::new(800, 600));

    viz.mount(Some(source.clone() as SharedSource), t0);
    viz.unmount();

    assert_eq!(viz.time_until_next_frame(t0), None);
    assert_eq!(run_frames(&mut viz, t0, 30, true), 0);
    assert_eq!(viz.surface().ctx.clears, 0);
    assert_eq!(source.released.load(Ordering::SeqCst), 1);
}

#[test]
fn ticks_keep_painting_while_idle() {
    let t0 = Instant::now();
    let mut viz = visualizer(RecordingSurface::new(800, 600));
    viz.mount(None, t0);

    let painted = run_frames(&mut viz, t0, 10, false);
    assert_eq!(painted, 10);
    assert_eq!(viz.surface().ctx.strokes, 50);
    assert_eq!(viz.surface().ctx.dots, 0);
}

#[test]
fn playing_without_analyzer_uses_default_levels() {
    let t0 = Instant::now();
    let mut viz = visualizer(RecordingSurface::new(800, 600));
    viz.mount(None, t0);

    let report = viz.on_frame(t0, true).unwrap();
    assert_eq!(report.volume, 0.5);
    assert_eq!(report.particles, 7);
    assert!(viz.analyzer().tap_kind().is_none());
}

#[test]
fn analyzer_feeds_the_renderer_each_tick() {
    let t0 = Instant::now();
    let source = FakeSource::new(false);
    let mut viz = visualizer(RecordingSurface::new(800, 600));
    viz.mount(Some(source.clone() as SharedSource), t0);
    assert_eq!(viz.analyzer().tap_kind(), Some(TapKind::Real));

    // Nothing has been played into the tap yet, so the spectrum is silent.
    let report = viz.on_frame(t0, true).unwrap();
    assert_eq!(report.volume, 0.0);
    assert_eq!(report.particles, 0);
}

#[test]
fn denied_audio_graph_falls_back_to_synthetic() {
    let t0 = Instant::now();
    let source = FakeSource::new(true);
    let mut viz = visualizer(RecordingSurface::new(800, 600));
    assert_eq!(viz.mount(Some(source.clone() as SharedSource), t0), MountStatus::Running);
    assert_eq!(viz.analyzer().tap_kind(), Some(TapKind::Synthetic));

    let painted = run_frames(&mut viz, t0, 20, true);
    assert_eq!(painted, 20);
    assert_eq!(source.opened.load(Ordering::SeqCst), 1);
}

#[test]
fn remount_releases_then_reattaches() {
    let t0 = Instant::now();
    let source = FakeSource::new(false);
    let mut viz = visualizer(RecordingSurface::new(800, 600));

    viz.mount(Some(source.clone() as SharedSource), t0);
    run_frames(&mut viz, t0, 3, true);
    viz.mount(Some(source.clone() as SharedSource), t0);

    assert_eq!(source.released.load(Ordering::SeqCst), 1);
    assert_eq!(source.opened.load(Ordering::SeqCst), 2);
    // The fresh mount restarts the phase.
    assert_eq!(viz.renderer().unwrap().phase(), 0.0);
}

#[test]
fn drop_releases_the_tap() {
    let source = FakeSource::new(false);
    {
        let mut viz = visualizer(RecordingSurface::new(800, 600));
        viz.mount(Some(source.clone() as SharedSource), Instant::now());
    }
    assert_eq!(source.released.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_context_at_mount_attaches_nothing() {
    let t0 = Instant::now();
    let source = FakeSource::new(false);
    let surface = RecordingSurface::new(800, 600);
    let available = Arc::clone(&surface.available);
    available.store(false, Ordering::SeqCst);

    let mut viz = visualizer(surface);
    assert_eq!(viz.mount(Some(source.clone() as SharedSource), t0), MountStatus::Inert);
    assert_eq!(source.opened.load(Ordering::SeqCst), 0);
    assert_eq!(run_frames(&mut viz, t0, 5, true), 0);

    available.store(true, Ordering::SeqCst);
    assert_eq!(run_frames(&mut viz, t0, 5, true), 0);
    assert_eq!(viz.mount(Some(source.clone() as SharedSource), t0), MountStatus::Running);
    assert!(viz.on_frame(t0, true).is_some());
}

#[test]
fn lost_context_skips_paints_but_keeps_ticking() {
    let t0 = Instant::now();
    let surface = RecordingSurface::new(800, 600);
    let available = Arc::clone(&surface.available);
    let mut viz = visualizer(surface);
    viz.mount(None, t0);

    available.store(false, Ordering::SeqCst);
    assert_eq!(run_frames(&mut viz, t0, 5, true), 0);
    assert!(viz.time_until_next_frame(t0).is_some());

    available.store(true, Ordering::SeqCst);
    let later = t0 + Duration::from_secs(1);
    assert_eq!(run_frames(&mut viz, later, 5, true), 5);
}

#[test]
fn phase_keeps_rising_across_play_state_changes() {
    let t0 = Instant::now();
    let mut viz = visualizer(RecordingSurface::new(320, 200));
    viz.mount(None, t0);

    let mut last = -1.0;
    for (i, playing) in [true, false, false, true, true, false].into_iter().enumerate() {
        let report = viz
            .on_frame(t0 + Duration::from_millis(40) * i as u32, playing)
            .unwrap();
        assert!(report.phase > last);
        last = report.phase;
    }
}
