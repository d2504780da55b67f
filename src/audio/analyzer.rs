//! Spectrum analysis for visualization using FFT.
//!
//! Produces one `AudioSnapshot` per frame, either from a real tap on the
//! playing source or from a synthetic generator when no tap can be opened.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ringbuf::traits::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tracing::{debug, info, warn};

use super::snapshot::AudioSnapshot;
use super::source::{AudioTap, SharedSource, SourceId};
use crate::config::AnalyzerConfig;

/// Upper bound on samples drained per frame, to keep the frame loop responsive
const MAX_SAMPLES_PER_UPDATE: usize = 8192;

/// Per-frame decay of the smoothed spectrum when the tap delivers nothing
const IDLE_DECAY: f32 = 0.95;

/// Where a snapshot's magnitudes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapKind {
    Real,
    Synthetic,
}

/// Analyzer for turning a live source into per-frame spectrum snapshots.
pub struct SpectrumAnalyzer {
    config: AnalyzerConfig,
    attachment: Option<Attachment>,
    /// Seed for the next synthetic tap
    next_seed: u64,
}

struct Attachment {
    source: SharedSource,
    tap: Tap,
    /// Source was not ready at attach; real tap is tried once it is
    awaiting_ready: bool,
}

/// Tagged tap, chosen at attach time.
enum Tap {
    Real(RealTap),
    Synthetic(SyntheticTap),
}

impl SpectrumAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            attachment: None,
            next_seed: 0,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.config.bin_count
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn attached_source(&self) -> Option<SourceId> {
        self.attachment.as_ref().map(|a| a.source.id())
    }

    pub fn tap_kind(&self) -> Option<TapKind> {
        self.attachment.as_ref().map(|a| match a.tap {
            Tap::Real(_) => TapKind::Real,
            Tap::Synthetic(_) => TapKind::Synthetic,
        })
    }

    /// Attach to a source. Re-attaching the same source is a no-op.
    ///
    /// Never fails: when no real tap can be opened the analyzer samples a
    /// synthetic spectrum for the lifetime of this attachment.
    pub fn attach(&mut self, source: SharedSource) {
        if self.attached_source() == Some(source.id()) {
            return;
        }
        self.detach();

        let seed = self.next_seed;
        self.next_seed = self.next_seed.wrapping_add(1);

        let (tap, awaiting_ready) = if source.is_ready() {
            (self.open_tap(&source, seed), false)
        } else {
            debug!(source = ?source.id(), "source not ready, sampling synthetically until it is");
            (Tap::Synthetic(SyntheticTap::new(seed, &self.config)), true)
        };

        self.attachment = Some(Attachment {
            source,
            tap,
            awaiting_ready,
        });
    }

    fn open_tap(&self, source: &SharedSource, seed: u64) -> Tap {
        match source.open_tap() {
            Ok(tap) => {
                info!(
                    source = ?source.id(),
                    sample_rate = tap.sample_rate(),
                    bins = self.config.bin_count,
                    "audio analysis attached"
                );
                Tap::Real(RealTap::new(tap, &self.config))
            }
            Err(err) => {
                warn!(
                    source = ?source.id(),
                    error = %err,
                    "audio analysis unavailable, using synthetic spectrum"
                );
                Tap::Synthetic(SyntheticTap::new(seed, &self.config))
            }
        }
    }

    /// Release the tap. Returns whether anything was attached.
    pub fn detach(&mut self) -> bool {
        match self.attachment.take() {
            Some(attachment) => {
                debug!(source = ?attachment.source.id(), "audio analysis detached");
                // Dropping the tap releases the source side of the ring buffer.
                drop(attachment);
                true
            }
            None => false,
        }
    }

    /// Sample the current spectrum, using wall-clock time for synthesis.
    pub fn sample(&mut self) -> Option<AudioSnapshot> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.sample_at(now)
    }

    /// Sample with an explicit time in seconds. Returns `None` when detached.
    pub fn sample_at(&mut self, time_secs: f64) -> Option<AudioSnapshot> {
        let pending = self.attachment.as_ref().and_then(|a| {
            if a.awaiting_ready && a.source.is_ready() {
                let seed = match &a.tap {
                    Tap::Synthetic(synthetic) => synthetic.seed,
                    Tap::Real(_) => 0,
                };
                Some((Arc::clone(&a.source), seed))
            } else {
                None
            }
        });
        if let Some((source, seed)) = pending {
            let tap = self.open_tap(&source, seed);
            if let Some(attachment) = self.attachment.as_mut() {
                attachment.tap = tap;
                attachment.awaiting_ready = false;
            }
        }

        let attachment = self.attachment.as_mut()?;
        let frequencies = match &mut attachment.tap {
            Tap::Real(real) => real.read_frequencies(),
            Tap::Synthetic(synthetic) => {
                synthetic.frequencies(time_secs, attachment.source.is_playing())
            }
        };
        Some(AudioSnapshot::from_frequencies(frequencies))
    }
}

impl Drop for SpectrumAnalyzer {
    fn drop(&mut self) {
        self.detach();
    }
}

/// FFT over the samples delivered by an `AudioTap`.
struct RealTap {
    tap: AudioTap,
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Most recent mono samples, oldest first
    history: Vec<f32>,
    window: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    /// Smoothed linear magnitudes, one per bin
    smoothed: Vec<f32>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
}

impl RealTap {
    fn new(tap: AudioTap, config: &AnalyzerConfig) -> Self {
        let fft_size = config.bin_count * 2;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            tap,
            fft,
            fft_size,
            history: vec![0.0; fft_size],
            window: blackman_window(fft_size),
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; config.bin_count],
            smoothing: config.smoothing,
            min_db: config.min_decibels,
            max_db: config.max_decibels,
        }
    }

    /// Drain new samples and return byte magnitudes for the current window.
    fn read_frequencies(&mut self) -> Vec<u8> {
        let fresh = self.drain();
        if fresh == 0 {
            for value in &mut self.smoothed {
                *value *= IDLE_DECAY;
            }
        } else {
            self.process_fft();
        }
        self.smoothed.iter().map(|&m| self.to_byte(m)).collect()
    }

    /// Pull interleaved samples, downmix to mono and append to the history.
    fn drain(&mut self) -> usize {
        let channels = usize::from(self.tap.channels());
        let consumer = self.tap.consumer_mut();
        let mut frame_sum = 0.0;
        let mut in_frame = 0;
        let mut read = 0;
        let mut mono = Vec::new();

        while read < MAX_SAMPLES_PER_UPDATE {
            let Some(sample) = consumer.try_pop() else {
                break;
            };
            read += 1;
            frame_sum += sample;
            in_frame += 1;
            if in_frame == channels {
                mono.push(frame_sum / channels as f32);
                frame_sum = 0.0;
                in_frame = 0;
            }
        }

        if mono.len() >= self.fft_size {
            let start = mono.len() - self.fft_size;
            self.history.copy_from_slice(&mono[start..]);
        } else if !mono.is_empty() {
            self.history.rotate_left(mono.len());
            let start = self.fft_size - mono.len();
            self.history[start..].copy_from_slice(&mono);
        }
        mono.len()
    }

    fn process_fft(&mut self) {
        for (i, (&sample, &w)) in self.history.iter().zip(&self.window).enumerate() {
            self.fft_buffer[i] = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.fft_buffer);

        let scale = 1.0 / self.fft_size as f32;
        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.fft_buffer[bin].norm() * scale;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
        }
    }

    /// Map a linear magnitude onto 0..=255 across the decibel window.
    fn to_byte(&self, magnitude: f32) -> u8 {
        if magnitude <= 0.0 {
            return 0;
        }
        let db = 20.0 * magnitude.log10();
        let scaled = 255.0 * (db - self.min_db) / (self.max_db - self.min_db);
        scaled.clamp(0.0, 255.0) as u8
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

/// Deterministic stand-in spectrum: a function of time and play state only.
struct SyntheticTap {
    seed: u64,
    bins: usize,
    idle_attenuation: f32,
}

impl SyntheticTap {
    fn new(seed: u64, config: &AnalyzerConfig) -> Self {
        Self {
            seed,
            bins: config.bin_count,
            idle_attenuation: config.idle_attenuation,
        }
    }

    fn frequencies(&self, time_secs: f64, playing: bool) -> Vec<u8> {
        synthetic_spectrum(self.bins, time_secs, self.seed, playing, self.idle_attenuation)
    }
}

/// Sum of three travelling sines per bin, scaled into the byte range.
///
/// Paused output is attenuated towards zero so it stays near the floor.
pub fn synthetic_spectrum(
    bins: usize,
    time_secs: f64,
    seed: u64,
    playing: bool,
    idle_attenuation: f32,
) -> Vec<u8> {
    let t = time_secs + seed as f64 * 0.37;
    let gain = if playing { 1.0 } else { f64::from(idle_attenuation) };

    (0..bins)
        .map(|i| {
            let f = i as f64 / bins as f64;
            let low = (t * 2.0 + f * 10.0).sin() * 0.5 + 0.5;
            let mid = (t * 3.0 + f * 15.0).sin() * 0.3 + 0.3;
            let high = (t * 4.0 + f * 20.0).sin() * 0.2 + 0.2;
            // Components peak at 2.0 combined.
            let level = (low + mid + high) / 2.0;
            (level * 255.0 * gain).floor().clamp(0.0, 255.0) as u8
        })
        .collect()
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}
