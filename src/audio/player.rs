//! Audio playback via cpal with real-time audio callback.
//!
//! The audio callback MUST NEVER allocate, lock mutexes, or block in any way.
//! Everything it touches is an atomic or the lock-free playback ring buffer.
//!
//! The output stream lives on its own thread so any handle can ask it to
//! resume after a stream error.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use ringbuf::{traits::*, HeapRb};
use tracing::{debug, error, info, warn};

use super::source::{AudioSource, AudioTap, SourceId};
use crate::error::AudioGraphError;

/// Atomic f32 for lock-free volume control.
/// Stores f32 bits as u32 for atomic operations.
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(val: f32) -> Self {
        Self(AtomicU32::new(val.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, val: f32) {
        self.0.store(val.to_bits(), Ordering::Relaxed);
    }
}

/// Ring buffer size: ~500ms of stereo audio at 44100 Hz
pub const RING_BUFFER_SIZE: usize = 44100;

/// Analysis ring buffer size: a few FFT windows of stereo audio
pub const ANALYSIS_BUFFER_SIZE: usize = 8192;

/// Audio configuration constants
pub const SAMPLE_RATE: u32 = 44100;
pub const CHANNELS: u16 = 2;
pub const BUFFER_SIZE: u32 = 512;

/// How long a tap request waits for the stream thread to answer a resume.
const RESUME_TIMEOUT: Duration = Duration::from_millis(500);

/// How long `init_buffer` waits for the stream thread to come up.
const START_TIMEOUT: Duration = Duration::from_secs(2);

/// Requests served by the thread that owns the output stream.
enum StreamCommand {
    Resume(mpsc::SyncSender<Result<(), String>>),
    Stop,
}

/// Slot the decoder feeds analysis samples into, if a tap is open.
#[derive(Clone, Default)]
pub struct TapSlot {
    inner: Arc<Mutex<TapSlotInner>>,
}

#[derive(Default)]
struct TapSlotInner {
    producer: Option<ringbuf::HeapProd<f32>>,
    generation: u64,
}

impl TapSlot {
    /// Install a fresh producer and return its generation.
    fn install(&self, producer: ringbuf::HeapProd<f32>) -> Result<u64, AudioGraphError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| AudioGraphError::Unavailable("tap slot poisoned".into()))?;
        inner.generation += 1;
        inner.producer = Some(producer);
        Ok(inner.generation)
    }

    /// Clear the producer if it still belongs to `generation`.
    fn release(&self, generation: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.generation == generation {
                inner.producer = None;
            }
        }
    }

    /// Push what fits. Analysis is non-critical, so overflow is dropped.
    pub fn push(&self, samples: &[f32]) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(producer) = inner.producer.as_mut() {
                let _ = producer.push_slice(samples);
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.producer.is_some())
            .unwrap_or(false)
    }
}

/// State shared between the player, its handles and the audio thread.
struct Shared {
    id: SourceId,
    volume: AtomicF32,
    paused: AtomicBool,
    ready: AtomicBool,
    stream_live: AtomicBool,
    frames_played: AtomicU64,
    tap: TapSlot,
    /// Channel to the stream thread; `None` while no stream exists
    control: Mutex<Option<mpsc::Sender<StreamCommand>>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            id: SourceId::next(),
            volume: AtomicF32::new(0.8),
            paused: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            stream_live: AtomicBool::new(false),
            frames_played: AtomicU64::new(0),
            tap: TapSlot::default(),
            control: Mutex::new(None),
        }
    }

    fn set_control(&self, control: Option<mpsc::Sender<StreamCommand>>) {
        if let Ok(mut slot) = self.control.lock() {
            *slot = control;
        }
    }

    /// Ask the stream thread to restart a stopped stream and wait for the answer.
    fn resume(&self) -> Result<(), AudioGraphError> {
        let control = self.control.lock().ok().and_then(|slot| slot.clone());
        let Some(control) = control else {
            warn!("no output stream to resume");
            return Err(AudioGraphError::Suspended);
        };

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        if control.send(StreamCommand::Resume(reply_tx)).is_err() {
            warn!("output stream thread is gone");
            return Err(AudioGraphError::Suspended);
        }

        match reply_rx.recv_timeout(RESUME_TIMEOUT) {
            Ok(Ok(())) => {
                info!("output stream resumed");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "output stream could not be resumed");
                Err(AudioGraphError::Suspended)
            }
            Err(_) => {
                warn!("output stream did not answer the resume request");
                Err(AudioGraphError::Suspended)
            }
        }
    }
}

/// Remembers the level to restore when unmuting.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MuteState {
    restore: Option<f32>,
}

impl MuteState {
    /// Flip the mute state and return the volume to apply.
    pub fn toggle(&mut self, current: f32) -> f32 {
        match self.restore.take() {
            Some(level) => level,
            None => {
                self.restore = Some(current);
                0.0
            }
        }
    }

    pub fn is_muted(&self) -> bool {
        self.restore.is_some()
    }

    /// Forget the saved level; an explicit volume change ends the mute.
    pub fn clear(&mut self) {
        self.restore = None;
    }
}

/// Audio player with real-time playback using cpal.
pub struct AudioPlayer {
    config: StreamConfig,
    stream_thread: Option<thread::JoinHandle<()>>,
    shared: Arc<Shared>,
    mute: MuteState,
}

impl AudioPlayer {
    /// Create a new audio player. Starts paused.
    pub fn new() -> Result<Self> {
        let device = default_device()?;
        debug!(device = %device.name().unwrap_or_default(), "output device found");

        Ok(Self {
            config: stream_config(),
            stream_thread: None,
            shared: Arc::new(Shared::new()),
            mute: MuteState::default(),
        })
    }

    /// Initialize the ring buffer, start the output stream and return the producer.
    pub fn init_buffer(&mut self) -> Result<ringbuf::HeapProd<f32>> {
        self.stop();

        let ring = HeapRb::<f32>::new(RING_BUFFER_SIZE);
        let (producer, consumer) = ring.split();

        self.shared.ready.store(false, Ordering::SeqCst);
        self.shared.frames_played.store(0, Ordering::SeqCst);

        self.start_stream(consumer)?;
        Ok(producer)
    }

    /// Spawn the thread that builds, plays and later resumes the output stream.
    fn start_stream(&mut self, consumer: ringbuf::HeapCons<f32>) -> Result<()> {
        let (command_tx, command_rx) = mpsc::channel();
        let (started_tx, started_rx) = mpsc::sync_channel(1);
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name("backdrop-output".into())
            .spawn(move || run_stream(&config, consumer, shared, started_tx, command_rx))
            .context("Failed to spawn output stream thread")?;
        self.stream_thread = Some(handle);

        let started = started_rx.recv_timeout(START_TIMEOUT);
        if let Ok(Ok(())) = started {
            self.shared.set_control(Some(command_tx));
            debug!("output stream started");
            return Ok(());
        }

        // Without a sender the thread exits as soon as it looks for commands.
        drop(command_tx);
        self.stop();
        match started {
            Ok(Err(e)) => Err(anyhow::anyhow!(e)).context("Failed to start audio stream"),
            _ => Err(anyhow::anyhow!("output stream thread did not start")),
        }
    }

    /// Lightweight read-only handle for the visualizer.
    pub fn handle(&self) -> PlaybackHandle {
        PlaybackHandle {
            shared: Arc::clone(&self.shared),
            sample_rate: self.config.sample_rate.0,
            channels: self.config.channels,
        }
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume.load()
    }

    pub fn set_volume(&mut self, vol: f32) {
        self.mute.clear();
        self.shared.volume.store(vol.clamp(0.0, 1.0));
    }

    pub fn volume_up(&mut self) -> f32 {
        let new_vol = (self.volume() + 0.05).min(1.0);
        self.set_volume(new_vol);
        new_vol
    }

    pub fn volume_down(&mut self) -> f32 {
        let new_vol = (self.volume() - 0.05).max(0.0);
        self.set_volume(new_vol);
        new_vol
    }

    /// Mute, or restore the level from before the mute. Returns whether muted.
    pub fn toggle_mute(&mut self) -> bool {
        let level = self.mute.toggle(self.volume());
        self.shared.volume.store(level);
        self.mute.is_muted()
    }

    pub fn is_muted(&self) -> bool {
        self.mute.is_muted()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    pub fn is_playing(&self) -> bool {
        !self.is_paused()
    }

    pub fn set_playing(&self, playing: bool) {
        self.shared.paused.store(!playing, Ordering::SeqCst);
    }

    pub fn toggle_pause(&self) -> bool {
        let was_paused = self.shared.paused.fetch_xor(true, Ordering::SeqCst);
        !was_paused
    }

    pub fn position(&self) -> Duration {
        self.handle().position()
    }

    /// Flags the decoder writes to.
    pub fn decoder_flags(&self) -> DecoderFlags {
        DecoderFlags {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stop(&mut self) {
        let control = self.shared.control.lock().ok().and_then(|mut slot| slot.take());
        if let Some(control) = control {
            let _ = control.send(StreamCommand::Stop);
        }
        if let Some(handle) = self.stream_thread.take() {
            // Dropping the last sender also ends the thread if Stop was never sent.
            let _ = handle.join();
        }
        self.shared.stream_live.store(false, Ordering::SeqCst);
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn default_device() -> Result<Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("No output device available"))
}

fn stream_config() -> StreamConfig {
    StreamConfig {
        channels: CHANNELS,
        sample_rate: SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Fixed(BUFFER_SIZE),
    }
}

/// Body of the output stream thread: build and play the stream, then serve
/// resume requests until told to stop.
fn run_stream(
    config: &StreamConfig,
    consumer: ringbuf::HeapCons<f32>,
    shared: Arc<Shared>,
    started: mpsc::SyncSender<Result<(), String>>,
    commands: mpsc::Receiver<StreamCommand>,
) {
    let stream = match build_stream(config, consumer, &shared) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = started.send(Err(format!("{e:#}")));
            return;
        }
    };
    shared.stream_live.store(true, Ordering::SeqCst);
    let _ = started.send(Ok(()));

    while let Ok(command) = commands.recv() {
        match command {
            StreamCommand::Resume(reply) => {
                let result = stream.play().map_err(|e| e.to_string());
                if result.is_ok() {
                    shared.stream_live.store(true, Ordering::SeqCst);
                }
                let _ = reply.send(result);
            }
            StreamCommand::Stop => break,
        }
    }

    shared.stream_live.store(false, Ordering::SeqCst);
    drop(stream);
    debug!("output stream stopped");
}

fn build_stream(
    config: &StreamConfig,
    mut consumer: ringbuf::HeapCons<f32>,
    shared: &Arc<Shared>,
) -> Result<Stream> {
    let device = default_device()?;
    let callback_shared = Arc::clone(shared);
    let error_flag = Arc::clone(shared);
    let channels = u64::from(config.channels);

    // This callback runs in a real-time audio thread.
    // It MUST NEVER: allocate, lock mutexes, log, panic, or block.
    let stream = device
        .build_output_stream(
            config,
            move |output: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let vol = callback_shared.volume.load();
                if callback_shared.paused.load(Ordering::Relaxed) {
                    output.fill(0.0);
                    return;
                }
                for sample in output.iter_mut() {
                    *sample = consumer.try_pop().unwrap_or(0.0) * vol;
                }
                callback_shared
                    .frames_played
                    .fetch_add(output.len() as u64 / channels, Ordering::Relaxed);
            },
            move |err| {
                error_flag.stream_live.store(false, Ordering::SeqCst);
                error!(error = %err, "audio stream error");
            },
            None,
        )
        .context("Failed to build output stream")?;

    stream.play().context("Failed to start audio stream")?;
    Ok(stream)
}

/// What the decoder thread reports back to the player.
#[derive(Clone)]
pub struct DecoderFlags {
    shared: Arc<Shared>,
}

impl DecoderFlags {
    pub fn mark_ready(&self) {
        self.shared.ready.store(true, Ordering::SeqCst);
    }

    pub fn tap(&self) -> &TapSlot {
        &self.shared.tap
    }
}

/// Read-only view of an `AudioPlayer`, usable as an `AudioSource`.
#[derive(Clone)]
pub struct PlaybackHandle {
    shared: Arc<Shared>,
    sample_rate: u32,
    channels: u16,
}

impl AudioSource for PlaybackHandle {
    fn id(&self) -> SourceId {
        self.shared.id
    }

    fn is_playing(&self) -> bool {
        !self.shared.paused.load(Ordering::Relaxed)
    }

    fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Relaxed)
    }

    fn volume(&self) -> f32 {
        self.shared.volume.load()
    }

    fn position(&self) -> Duration {
        let frames = self.shared.frames_played.load(Ordering::Relaxed);
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate.max(1)))
    }

    fn open_tap(&self) -> Result<AudioTap, AudioGraphError> {
        if !self.shared.stream_live.load(Ordering::SeqCst) {
            self.shared.resume()?;
        }

        let (producer, consumer) = HeapRb::<f32>::new(ANALYSIS_BUFFER_SIZE).split();
        let generation = self.shared.tap.install(producer)?;
        let slot = self.shared.tap.clone();

        Ok(AudioTap::new(consumer, self.channels, self.sample_rate)
            .on_release(move || slot.release(generation)))
    }
}
