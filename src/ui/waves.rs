//! Layered audio-reactive wave renderer.
//!
//! Paints a handful of overlapping sine waves across the surface plus a few
//! drifting particles while audio plays. Phase keeps advancing when idle so
//! the backdrop breathes instead of freezing.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::surface::{DrawContext, Gradient, Rgba, SurfaceSize};
use crate::audio::AudioSnapshot;
use crate::config::WaveConfig;

pub const AMBER: Rgba = Rgba::new(255, 184, 0, 1.0);
pub const RED: Rgba = Rgba::new(255, 84, 84, 1.0);
pub const CYAN: Rgba = Rgba::new(100, 200, 255, 1.0);

/// Fallback levels when no spectrum is supplied: (playing, idle).
const DEFAULT_VOLUME: (f64, f64) = (0.5, 0.2);
const DEFAULT_BASS: (f64, f64) = (0.3, 0.1);

/// Renderer state that lives as long as the mounted surface.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    pub phase: f64,
    pub size: SurfaceSize,
    pub center_y: f64,
    pub max_amplitude: f64,
}

impl RenderState {
    fn new(size: SurfaceSize) -> Self {
        let mut state = Self {
            phase: 0.0,
            size,
            center_y: 0.0,
            max_amplitude: 0.0,
        };
        state.relayout(size);
        state
    }

    fn relayout(&mut self, size: SurfaceSize) {
        self.size = size;
        self.center_y = f64::from(size.height) / 2.0;
        self.max_amplitude = f64::from(size.height) / 6.0;
    }
}

/// What one paint produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintReport {
    /// Phase the frame was drawn at
    pub phase: f64,
    pub volume: f64,
    pub bass: f64,
    pub layer_amplitudes: Vec<f64>,
    pub particles: usize,
}

pub struct WaveRenderer {
    config: WaveConfig,
    state: RenderState,
    rng: StdRng,
    points: Vec<(f64, f64)>,
}

impl WaveRenderer {
    pub fn new(config: WaveConfig, size: SurfaceSize) -> Self {
        Self::with_rng(config, size, StdRng::from_entropy())
    }

    /// Renderer with reproducible particle placement.
    pub fn seeded(config: WaveConfig, size: SurfaceSize, seed: u64) -> Self {
        Self::with_rng(config, size, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: WaveConfig, size: SurfaceSize, rng: StdRng) -> Self {
        Self {
            config,
            state: RenderState::new(size),
            rng,
            points: Vec::new(),
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn phase(&self) -> f64 {
        self.state.phase
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.state.relayout(SurfaceSize::new(width, height));
    }

    /// Amplitude of layer `k` at the given volume.
    pub fn layer_amplitude(&self, layer: usize, volume: f64) -> f64 {
        let k = layer as f64;
        self.state.max_amplitude
            * (self.config.amplitude_base + self.config.amplitude_step * k)
            * (0.7 + 0.6 * volume)
    }

    /// Number of particles drawn for a frame.
    pub fn particle_count(&self, playing: bool, volume: f64) -> usize {
        if playing && volume > self.config.particle_threshold {
            (volume * self.config.particle_scale).floor() as usize
        } else {
            0
        }
    }

    /// Clear and draw one frame, then advance the phase.
    pub fn paint(
        &mut self,
        ctx: &mut dyn DrawContext,
        playing: bool,
        audio: Option<&AudioSnapshot>,
    ) -> PaintReport {
        let (volume, bass) = match audio {
            Some(snapshot) => (f64::from(snapshot.volume), f64::from(snapshot.bass)),
            None if playing => (DEFAULT_VOLUME.0, DEFAULT_BASS.0),
            None => (DEFAULT_VOLUME.1, DEFAULT_BASS.1),
        };

        ctx.clear();

        let mut layer_amplitudes = Vec::with_capacity(self.config.layers);
        for layer in 0..self.config.layers {
            layer_amplitudes.push(self.paint_layer(ctx, layer, volume, bass));
        }

        let particles = self.particle_count(playing, volume);
        self.paint_particles(ctx, particles, volume);

        let phase = self.state.phase;
        self.state.phase += if playing {
            self.config.phase_step_playing
        } else {
            self.config.phase_step_idle
        };

        PaintReport {
            phase,
            volume,
            bass,
            layer_amplitudes,
            particles,
        }
    }

    fn paint_layer(
        &mut self,
        ctx: &mut dyn DrawContext,
        layer: usize,
        volume: f64,
        bass: f64,
    ) -> f64 {
        let cfg = &self.config;
        let k = layer as f64;
        let width = f64::from(self.state.size.width);
        let center_y = self.state.center_y;
        let max_amplitude = self.state.max_amplitude;
        let phase = self.state.phase;

        let frequency = cfg.base_frequency + cfg.frequency_step * k;
        let speed = cfg.base_speed + cfg.speed_step * k;
        let amplitude = self.layer_amplitude(layer, volume);

        let samples = (width / cfg.sample_spacing).floor() as usize;
        if samples == 0 {
            return amplitude;
        }

        self.points.clear();
        self.points.push((0.0, center_y));
        for i in 0..=samples {
            let fi = i as f64;
            let x = width / samples as f64 * fi;
            let wave = (fi * frequency + phase * speed).sin() * amplitude
                + (fi * frequency * 2.0 + phase * speed * 1.2).sin() * amplitude * 0.4
                + (fi * frequency * 0.5 + phase * speed * 0.8).sin() * amplitude * 0.6;
            let ripple = (phase * 0.1 + fi * 0.01).sin() * bass * max_amplitude * 0.3;
            self.points.push((x, center_y + wave + ripple));
        }

        let alpha = (0.15 - 0.02 * k) * (0.8 + 0.4 * volume);
        let line_width = (3.0 - 0.3 * k) * (0.8 + 0.4 * volume);
        ctx.stroke_path(&self.points, &layer_gradient(alpha), line_width);

        amplitude
    }

    fn paint_particles(&mut self, ctx: &mut dyn DrawContext, count: usize, volume: f64) {
        let width = f64::from(self.state.size.width);
        if width <= 0.0 {
            return;
        }
        for i in 0..count {
            let x = self.rng.gen_range(0.0..width);
            let y = self.state.center_y
                + (self.state.phase * 0.05 + i as f64).sin() * self.state.max_amplitude * volume;
            let radius = self.rng.gen_range(1.0..=3.0);
            let alpha = self.rng.gen_range(0.1..=0.4);
            ctx.fill_circle(x, y, radius, AMBER.with_alpha(alpha));
        }
    }
}

/// Amber, red, cyan and back to amber across the width.
pub fn layer_gradient(alpha: f64) -> Gradient {
    Gradient::new(vec![
        (0.0, AMBER.with_alpha(alpha)),
        (0.3, RED.with_alpha(alpha * 1.2)),
        (0.6, CYAN.with_alpha(alpha)),
        (1.0, AMBER.with_alpha(alpha)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::surface::{Scene, Shape};
    use proptest::prelude::*;

    fn renderer(width: u32, height: u32) -> WaveRenderer {
        WaveRenderer::seeded(WaveConfig::default(), SurfaceSize::new(width, height), 7)
    }

    #[test]
    fn resize_recomputes_layout() {
        let mut r = renderer(10, 10);
        r.resize(1920, 1080);
        assert_eq!(r.state().max_amplitude, 1080.0 / 6.0);
        assert_eq!(r.state().center_y, 540.0);
    }

    #[test]
    fn draws_five_layers_sampled_every_eight_pixels() {
        let mut r = renderer(800, 600);
        let mut scene = Scene::default();
        r.paint(&mut scene, false, None);

        let strokes: Vec<_> = scene.strokes().collect();
        assert_eq!(strokes.len(), 5);
        for stroke in strokes {
            let Shape::Stroke { points, .. } = stroke else { unreachable!() };
            // Starting point plus 100 + 1 samples.
            assert_eq!(points.len(), 102);
            assert_eq!(points[0], (0.0, 300.0));
            assert_eq!(points.last().unwrap().0, 800.0);
        }
    }

    #[test]
    fn layers_thin_and_fade_towards_the_front() {
        let mut r = renderer(400, 300);
        let mut scene = Scene::default();
        r.paint(&mut scene, true, None);

        let widths: Vec<f64> = scene
            .strokes()
            .map(|s| match s {
                Shape::Stroke { line_width, .. } => *line_width,
                _ => unreachable!(),
            })
            .collect();
        // volume 0.5 while playing without data
        assert!((widths[0] - 3.0).abs() < 1e-12);
        assert!(widths.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn gradient_cycles_back_to_amber() {
        let g = layer_gradient(0.1);
        let stops = g.stops();
        assert_eq!(stops.len(), 4);
        assert_eq!(stops[0].1, AMBER.with_alpha(0.1));
        assert_eq!(stops[1].1, RED.with_alpha(0.1 * 1.2));
        assert_eq!(stops[2].1, CYAN.with_alpha(0.1));
        assert_eq!(stops[3].1, AMBER.with_alpha(0.1));
    }

    #[test]
    fn idle_defaults_apply_without_audio() {
        let mut r = renderer(400, 300);
        let mut scene = Scene::default();
        let idle = r.paint(&mut scene, false, None);
        assert_eq!((idle.volume, idle.bass), (0.2, 0.1));
        assert_eq!(idle.particles, 0);
        let playing = r.paint(&mut scene, true, None);
        assert_eq!((playing.volume, playing.bass), (0.5, 0.3));
        assert_eq!(playing.particles, 7);
    }

    #[test]
    fn phase_advances_by_play_state() {
        let mut r = renderer(400, 300);
        let mut scene = Scene::default();
        r.paint(&mut scene, true, None);
        assert!((r.phase() - 0.05).abs() < 1e-12);
        r.paint(&mut scene, false, None);
        assert!((r.phase() - 0.07).abs() < 1e-12);
    }

    #[test]
    fn loud_audio_sets_amplitude_and_particles() {
        let mut r = renderer(1280, 720);
        let snapshot = AudioSnapshot {
            frequencies: vec![200; 128],
            volume: 0.78,
            bass: 0.6,
            treble: 0.5,
        };
        let mut scene = Scene::default();
        let report = r.paint(&mut scene, true, Some(&snapshot));

        let max_amplitude = 720.0 / 6.0;
        let volume = f64::from(0.78f32);
        assert_eq!(report.layer_amplitudes[0], max_amplitude * 0.3 * (0.7 + 0.6 * volume));
        assert_eq!(report.particles, 11);
        assert_eq!(scene.dots().count(), 11);
    }

    #[test]
    fn particles_stay_on_the_surface() {
        let mut r = renderer(640, 480);
        let snapshot = AudioSnapshot::from_frequencies(vec![255; 128]);
        let mut scene = Scene::default();
        r.paint(&mut scene, true, Some(&snapshot));
        for dot in scene.dots() {
            let Shape::Dot { x, radius, color, .. } = dot else { unreachable!() };
            assert!((0.0..640.0).contains(x));
            assert!((1.0..=3.0).contains(radius));
            assert!((0.1..=0.4).contains(&color.a));
            assert_eq!((color.r, color.g, color.b), (255, 184, 0));
        }
    }

    #[test]
    fn no_particles_when_paused_even_if_loud() {
        let mut r = renderer(640, 480);
        let snapshot = AudioSnapshot::from_frequencies(vec![255; 128]);
        let mut scene = Scene::default();
        assert_eq!(r.paint(&mut scene, false, Some(&snapshot)).particles, 0);
    }

    #[test]
    fn narrow_surface_draws_no_waves() {
        let mut r = renderer(4, 300);
        let mut scene = Scene::default();
        r.paint(&mut scene, true, None);
        assert_eq!(scene.strokes().count(), 0);
    }

    #[test]
    fn each_paint_starts_from_a_clear_surface() {
        let mut r = renderer(400, 300);
        let mut scene = Scene::default();
        r.paint(&mut scene, false, None);
        r.paint(&mut scene, false, None);
        assert_eq!(scene.shapes().len(), 5);
    }

    proptest! {
        #[test]
        fn phase_never_decreases(states in prop::collection::vec(any::<bool>(), 1..64)) {
            let mut r = renderer(160, 90);
            let mut scene = Scene::default();
            let mut last = r.phase();
            for playing in states {
                r.paint(&mut scene, playing, None);
                prop_assert!(r.phase() > last);
                last = r.phase();
            }
        }

        #[test]
        fn resize_sets_amplitude_to_a_sixth(w in 1u32..8000, h in 1u32..8000) {
            let mut r = renderer(10, 10);
            r.resize(w, h);
            prop_assert_eq!(r.state().max_amplitude, f64::from(h) / 6.0);
            prop_assert_eq!(r.state().center_y, f64::from(h) / 2.0);
        }
    }
}
