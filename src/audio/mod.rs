//! Audio capture module
//!
//! Wraps the platform audio input device behind the [`AudioSource`]
//! trait. Sources deliver fixed-size [`AudioBlock`]s over a bounded
//! channel; the device callback never blocks on the consumer. When the
//! handoff queue is full a block is dropped and the sequence number
//! still advances, so the consumer observes the loss as a gap instead
//! of silent corruption.
//!
//! The cpal implementation works with PipeWire, PulseAudio, and ALSA.

pub mod cpal_source;

use crate::config::AudioConfig;
use crate::error::AudioError;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// One fixed-size chunk of mono PCM samples from the device.
/// Immutable once produced; `seq` is contiguous per stream, including
/// blocks that were dropped at the handoff queue.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    /// Position of this block in the stream, starting at 0
    pub seq: u64,
    /// When the device callback produced the block
    pub captured_at: Instant,
    /// Mono samples at the configured sample rate
    pub samples: Vec<f32>,
}

/// Events delivered by an open audio source
#[derive(Debug)]
pub enum SourceEvent {
    /// A captured block of samples
    Block(AudioBlock),
    /// The stream failed and will deliver no further blocks
    /// (device disconnected, permission revoked, backend error)
    Failed(AudioError),
}

/// Statistics reported when a source is closed
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceStats {
    /// Blocks delivered into the handoff queue
    pub blocks_sent: u64,
    /// Blocks dropped because the queue was full
    pub blocks_dropped: u64,
}

/// Trait for audio source implementations
#[async_trait::async_trait]
pub trait AudioSource: Send {
    /// Open the device and start capturing.
    /// Returns a bounded channel of [`SourceEvent`]s (mono f32 samples
    /// at the configured sample rate).
    async fn open(&mut self) -> Result<mpsc::Receiver<SourceEvent>, AudioError>;

    /// Stop capturing, release the device, and report stream stats.
    async fn close(&mut self) -> Result<SourceStats, AudioError>;
}

/// Factory for audio sources; the coordinator creates one source per
/// recording session.
pub trait SourceFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn AudioSource>, AudioError>;
}

/// cpal-backed factory used by the daemon
pub struct CpalSourceFactory {
    config: AudioConfig,
}

impl CpalSourceFactory {
    pub fn new(config: &AudioConfig) -> Arc<Self> {
        Arc::new(Self {
            config: config.clone(),
        })
    }
}

impl SourceFactory for CpalSourceFactory {
    fn create(&self) -> Result<Box<dyn AudioSource>, AudioError> {
        Ok(Box::new(cpal_source::CpalSource::new(&self.config)?))
    }
}

/// Linear interpolation resampling.
/// Good enough for speech input; swap for `rubato` if quality matters.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };

        output.push(sample);
    }

    output
}
