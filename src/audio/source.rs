//! The playable media handle the visualizer observes.
//!
//! Sources are owned by the playback controller. The visualizer only reads
//! play state and may open an analysis tap; it never changes playback.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::AudioGraphError;

/// Identity of a source, used to make `attach` idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Read-only view of a playing (or paused) audio stream.
pub trait AudioSource {
    fn id(&self) -> SourceId;

    fn is_playing(&self) -> bool;

    /// Whether the source has decoded enough audio to be analyzed.
    fn is_ready(&self) -> bool;

    fn volume(&self) -> f32;

    fn position(&self) -> Duration;

    /// Open a tap delivering a copy of the samples being played.
    fn open_tap(&self) -> Result<AudioTap, AudioGraphError>;
}

/// Shared handle to a source, as passed into the visualizer.
pub type SharedSource = Arc<dyn AudioSource>;

/// Consumer side of an analysis ring buffer.
///
/// Dropping the tap runs its release hook exactly once, which lets the source
/// stop feeding the buffer.
pub struct AudioTap {
    consumer: ringbuf::HeapCons<f32>,
    channels: u16,
    sample_rate: u32,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl AudioTap {
    pub fn new(consumer: ringbuf::HeapCons<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            consumer,
            channels: channels.max(1),
            sample_rate,
            release: None,
        }
    }

    /// Attach a hook run when the tap is released.
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn consumer_mut(&mut self) -> &mut ringbuf::HeapCons<f32> {
        &mut self.consumer
    }
}

impl fmt::Debug for AudioTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioTap")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("released", &self.release.is_none())
            .finish()
    }
}

impl Drop for AudioTap {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
