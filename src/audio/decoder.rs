//! File decoder using symphonia.
//!
//! Decodes the backdrop track on a background thread, looping it, and pushes
//! interleaved stereo PCM to the playback ring buffer. A copy goes to the
//! analysis tap when one is open.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use ringbuf::traits::*;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, error, info, warn};

use super::player::{DecoderFlags, SAMPLE_RATE};

/// How the decode of one pass through the file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassEnd {
    EndOfFile,
    Stopped,
}

/// Background decoder for the backdrop track.
pub struct AudioDecoder {
    /// Flag to signal the decoder to stop
    should_stop: Arc<AtomicBool>,
    /// Decoder thread handle
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl AudioDecoder {
    pub fn new() -> Self {
        Self {
            should_stop: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Start decoding `path` in a background thread, looping at end of file.
    pub fn start(
        &mut self,
        path: &Path,
        mut producer: ringbuf::HeapProd<f32>,
        flags: DecoderFlags,
    ) -> Result<()> {
        self.stop();

        // Fail early on an unreadable file rather than inside the thread.
        File::open(path).with_context(|| format!("Failed to open audio file {}", path.display()))?;

        let should_stop = Arc::new(AtomicBool::new(false));
        self.should_stop = Arc::clone(&should_stop);
        let path = path.to_path_buf();

        let handle = thread::Builder::new()
            .name("backdrop-decoder".into())
            .spawn(move || {
                info!(path = %path.display(), "decoder started");
                loop {
                    match decode_pass(&path, &mut producer, &should_stop, &flags) {
                        Ok(PassEnd::EndOfFile) => debug!("end of file, looping"),
                        Ok(PassEnd::Stopped) => break,
                        Err(e) => {
                            error!(error = %format!("{e:#}"), "decoder error");
                            break;
                        }
                    }
                }
            })
            .context("Failed to spawn decoder thread")?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop the current decode operation.
    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            // Give the thread a moment, then let it detach; it exits on its own.
            let start = Instant::now();
            while !handle.is_finished() {
                if start.elapsed() > Duration::from_millis(500) {
                    warn!("decoder thread slow to stop, detaching");
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

impl Default for AudioDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioDecoder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decode the file once from the start.
fn decode_pass(
    path: &Path,
    producer: &mut ringbuf::HeapProd<f32>,
    should_stop: &AtomicBool,
    flags: &DecoderFlags,
) -> Result<PassEnd> {
    let file = File::open(path).context("Failed to open audio file")?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow::anyhow!("No audio track found"))?;
    let track_id = track.id;
    if let Some(rate) = track.codec_params.sample_rate {
        if rate != SAMPLE_RATE {
            warn!(rate, output = SAMPLE_RATE, "track is not resampled and plays off-pitch");
        }
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create decoder")?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut stereo = Vec::new();

    loop {
        if should_stop.load(Ordering::Relaxed) {
            return Ok(PassEnd::Stopped);
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(PassEnd::EndOfFile);
            }
            Err(e) => return Err(e).context("Packet read error"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(error = %e, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e).context("Decode error"),
        };

        let spec = *decoded.spec();
        let buf = sample_buf
            .get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        if buf.capacity() < decoded.capacity() * spec.channels.count() {
            *buf = SampleBuffer::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);

        to_stereo(buf.samples(), spec.channels.count(), &mut stereo);
        push_samples(&stereo, producer, should_stop);
        flags.tap().push(&stereo);
        flags.mark_ready();
    }
}

/// Interleaved stereo from any channel count: mono is duplicated, extra
/// channels beyond the first two are dropped.
fn to_stereo(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    match channels {
        0 => {}
        1 => {
            for &s in interleaved {
                out.push(s);
                out.push(s);
            }
        }
        n => {
            for frame in interleaved.chunks_exact(n) {
                out.push(frame[0]);
                out.push(frame[1]);
            }
        }
    }
}

/// Push to the playback ring buffer with backpressure.
fn push_samples(samples: &[f32], producer: &mut ringbuf::HeapProd<f32>, should_stop: &AtomicBool) {
    let mut offset = 0;
    while offset < samples.len() {
        if should_stop.load(Ordering::Relaxed) {
            break;
        }

        let written = producer.push_slice(&samples[offset..]);
        offset += written;

        if written == 0 {
            // Buffer is full (or playback is paused), wait for the consumer.
            thread::sleep(Duration::from_millis(5));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_is_duplicated() {
        let mut out = Vec::new();
        to_stereo(&[0.1, 0.2], 1, &mut out);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn surround_keeps_front_pair() {
        let mut out = Vec::new();
        to_stereo(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, &mut out);
        assert_eq!(out, vec![1.0, 2.0, 4.0, 5.0]);
    }
}
