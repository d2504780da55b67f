//! Per-frame spectrum summary handed from the analyzer to the renderer.

/// Largest byte magnitude, used for normalization.
const MAX_MAGNITUDE: f32 = 255.0;

/// Fraction of bins, from the bottom, that count as bass.
const BASS_FRACTION: f32 = 0.1;

/// Fraction of bins below the treble range.
const TREBLE_START_FRACTION: f32 = 0.8;

/// One frame of frequency-domain data plus its scalar summaries.
///
/// `volume`, `bass` and `treble` are always within [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSnapshot {
    /// Byte magnitudes, lowest frequency first
    pub frequencies: Vec<u8>,
    pub volume: f32,
    pub bass: f32,
    pub treble: f32,
}

impl AudioSnapshot {
    /// Build a snapshot, deriving the summaries from the magnitudes.
    pub fn from_frequencies(frequencies: Vec<u8>) -> Self {
        let (bass_range, treble_range) = band_ranges(frequencies.len());
        let volume = normalized_mean(&frequencies);
        let bass = normalized_mean(&frequencies[bass_range]);
        let treble = normalized_mean(&frequencies[treble_range]);

        Self {
            frequencies,
            volume,
            bass,
            treble,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.frequencies.len()
    }
}

/// Bin ranges for bass `[0, floor(0.1N))` and treble `[floor(0.8N), N)`.
pub fn band_ranges(n: usize) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let bass_end = (n as f32 * BASS_FRACTION).floor() as usize;
    let treble_start = ((n as f32 * TREBLE_START_FRACTION).floor() as usize).min(n);
    (0..bass_end.min(n), treble_start..n)
}

/// Mean magnitude scaled to [0, 1]; an empty slice yields 0.
pub fn normalized_mean(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| u64::from(b)).sum();
    let mean = sum as f32 / bins.len() as f32 / MAX_MAGNITUDE;
    mean.clamp(0.0, 1.0)
}
