//! Mount lifecycle for the backdrop: sample, paint, reschedule.
//!
//! Everything acquired at mount (analysis tap, outstanding tick) is released
//! by `unmount`, which also runs on drop.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::audio::{AudioSnapshot, SharedSource, SpectrumAnalyzer};
use crate::config::Config;
use crate::scheduler::FrameScheduler;
use crate::ui::surface::{Surface, SurfaceSize};
use crate::ui::waves::{PaintReport, WaveRenderer};

/// Outcome of a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStatus {
    /// Ticking and painting
    Running,
    /// No drawing context; nothing is painted until the next mount
    Inert,
}

pub struct BackgroundVisualizer<S: Surface> {
    surface: S,
    config: Config,
    analyzer: SpectrumAnalyzer,
    scheduler: FrameScheduler,
    renderer: Option<WaveRenderer>,
    status: Option<MountStatus>,
    particle_seed: Option<u64>,
    frames_painted: u64,
}

impl<S: Surface> BackgroundVisualizer<S> {
    pub fn new(surface: S, config: Config) -> Self {
        Self {
            surface,
            analyzer: SpectrumAnalyzer::new(config.analyzer.clone()),
            scheduler: FrameScheduler::new(config.frame_rate),
            config,
            renderer: None,
            status: None,
            particle_seed: None,
            frames_painted: 0,
        }
    }

    /// Use a fixed seed for particle placement.
    pub fn with_particle_seed(mut self, seed: u64) -> Self {
        self.particle_seed = Some(seed);
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn analyzer(&self) -> &SpectrumAnalyzer {
        &self.analyzer
    }

    pub fn renderer(&self) -> Option<&WaveRenderer> {
        self.renderer.as_ref()
    }

    pub fn status(&self) -> Option<MountStatus> {
        self.status
    }

    pub fn is_mounted(&self) -> bool {
        self.status.is_some()
    }

    pub fn frames_painted(&self) -> u64 {
        self.frames_painted
    }

    /// Time until the next frame is due, `None` when nothing is scheduled.
    pub fn time_until_next_frame(&self, now: Instant) -> Option<Duration> {
        self.scheduler.time_until_due(now)
    }

    /// Mount onto the surface. Remounting tears the previous mount down first.
    pub fn mount(&mut self, source: Option<SharedSource>, now: Instant) -> MountStatus {
        if self.is_mounted() {
            self.unmount();
        }

        let size = self.surface.device_size();
        if let Err(err) = self.surface.context() {
            warn!(error = %err, "no drawing context, backdrop stays blank until remounted");
            self.status = Some(MountStatus::Inert);
            return MountStatus::Inert;
        }

        let renderer = match self.particle_seed {
            Some(seed) => WaveRenderer::seeded(self.config.waves.clone(), size, seed),
            None => WaveRenderer::new(self.config.waves.clone(), size),
        };
        self.renderer = Some(renderer);

        if let Some(source) = source {
            self.analyzer.attach(source);
        }

        self.scheduler.schedule_now(now);
        info!(
            width = size.width,
            height = size.height,
            analyzer = ?self.analyzer.tap_kind(),
            "backdrop mounted"
        );
        self.status = Some(MountStatus::Running);
        MountStatus::Running
    }

    /// Surface changed size; takes effect from the next paint.
    pub fn resize(&mut self, size: SurfaceSize) {
        self.surface.resize(size);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.resize(size.width, size.height);
        }
        debug!(width = size.width, height = size.height, "backdrop resized");
    }

    /// Run the due tick, if any: sample, paint, schedule the next one.
    pub fn on_frame(&mut self, now: Instant, playing: bool) -> Option<PaintReport> {
        let token = self.scheduler.poll(now)?;
        debug_assert!(self.scheduler.is_current(&token));

        let snapshot: Option<AudioSnapshot> = self.analyzer.sample();
        let report = match (self.renderer.as_mut(), self.surface.context()) {
            (Some(renderer), Ok(ctx)) => Some(renderer.paint(ctx, playing, snapshot.as_ref())),
            (Some(_), Err(err)) => {
                debug!(error = %err, frame = token.frame(), "skipping paint");
                None
            }
            (None, _) => None,
        };
        if report.is_some() {
            self.frames_painted += 1;
        }

        self.scheduler.schedule(now);
        report
    }

    /// Cancel the outstanding tick and release the analysis tap.
    pub fn unmount(&mut self) {
        if self.status.take().is_none() {
            return;
        }
        self.scheduler.cancel();
        self.analyzer.detach();
        self.renderer = None;
        info!(frames = self.frames_painted, "backdrop unmounted");
    }
}

impl<S: Surface> Drop for BackgroundVisualizer<S> {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::surface::TerminalSurface;

    fn visualizer(size: SurfaceSize) -> BackgroundVisualizer<TerminalSurface> {
        BackgroundVisualizer::new(TerminalSurface::new(size), Config::default())
            .with_particle_seed(1)
    }

    #[test]
    fn first_frame_paints_immediately() {
        let t0 = Instant::now();
        let mut viz = visualizer(SurfaceSize::new(320, 160));
        assert_eq!(viz.mount(None, t0), MountStatus::Running);
        assert!(viz.on_frame(t0, false).is_some());
        assert_eq!(viz.surface().scene().strokes().count(), 5);
    }

    #[test]
    fn frames_follow_the_frame_rate() {
        let t0 = Instant::now();
        let mut viz = visualizer(SurfaceSize::new(320, 160));
        viz.mount(None, t0);
        viz.on_frame(t0, true);
        assert!(viz.on_frame(t0 + Duration::from_millis(1), true).is_none());
        assert!(viz.on_frame(t0 + Duration::from_millis(40), true).is_some());
        assert_eq!(viz.frames_painted(), 2);
    }

    #[test]
    fn zero_sized_surface_mounts_inert() {
        let t0 = Instant::now();
        let mut viz = visualizer(SurfaceSize::new(0, 0));
        assert_eq!(viz.mount(None, t0), MountStatus::Inert);
        assert!(viz.time_until_next_frame(t0).is_none());
        assert!(viz.on_frame(t0 + Duration::from_secs(1), true).is_none());
    }

    #[test]
    fn remount_retries_the_context() {
        let t0 = Instant::now();
        let mut viz = visualizer(SurfaceSize::new(0, 0));
        viz.mount(None, t0);
        viz.resize(SurfaceSize::from_cells(80, 24));
        assert_eq!(viz.mount(None, t0), MountStatus::Running);
        assert!(viz.on_frame(t0, false).is_some());
    }

    #[test]
    fn resize_applies_before_next_paint() {
        let t0 = Instant::now();
        let mut viz = visualizer(SurfaceSize::new(320, 160));
        viz.mount(None, t0);
        viz.resize(SurfaceSize::new(640, 480));
        viz.on_frame(t0, false);
        let state = viz.renderer().unwrap().state();
        assert_eq!(state.max_amplitude, 80.0);
        assert_eq!(state.size, SurfaceSize::new(640, 480));
    }

    #[test]
    fn unmount_stops_ticking() {
        let t0 = Instant::now();
        let mut viz = visualizer(SurfaceSize::new(320, 160));
        viz.mount(None, t0);
        viz.on_frame(t0, true);
        viz.unmount();
        viz.unmount();
        assert!(viz.on_frame(t0 + Duration::from_secs(5), true).is_none());
        assert_eq!(viz.frames_painted(), 1);
        assert!(!viz.is_mounted());
    }
}
