//! cpal-based audio source
//!
//! Uses the cpal crate for cross-platform audio input. Works with
//! PipeWire, PulseAudio, and ALSA backends.
//!
//! The device callback does mixdown, resampling, and block assembly,
//! then hands each finished block to the consumer with `try_send`. It
//! never waits on the consumer: when the bounded queue is full the
//! block is dropped and the sequence number still advances, so the
//! session sees the loss as a gap.
//!
//! Note: cpal::Stream is not Send, so the stream lives on a dedicated
//! thread and we communicate via channels.

use super::{AudioBlock, AudioSource, SourceEvent, SourceStats};
use crate::config::AudioConfig;
use crate::error::AudioError;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Commands sent to the capture thread
enum CaptureCommand {
    Stop(oneshot::Sender<SourceStats>),
}

/// Block assembly state shared between the device callback and the
/// capture thread (for the final flush on stop)
struct Assembler {
    pending: Vec<f32>,
    block_size: usize,
    next_seq: u64,
    stats: SourceStats,
    tx: mpsc::Sender<SourceEvent>,
}

impl Assembler {
    /// Append resampled mono samples and emit every completed block.
    /// Runs on the device callback thread, so nothing here may block.
    fn push(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            let block = std::mem::replace(&mut self.pending, rest);
            self.emit(block);
        }
    }

    /// Emit whatever is left as a final short block
    fn flush(&mut self) {
        if !self.pending.is_empty() {
            let block = std::mem::take(&mut self.pending);
            self.emit(block);
        }
    }

    fn emit(&mut self, samples: Vec<f32>) {
        let block = AudioBlock {
            seq: self.next_seq,
            captured_at: Instant::now(),
            samples,
        };
        self.next_seq += 1;

        match self.tx.try_send(SourceEvent::Block(block)) {
            Ok(()) => self.stats.blocks_sent += 1,
            Err(_) => {
                // Queue full or receiver gone; the seq gap records it
                self.stats.blocks_dropped += 1;
            }
        }
    }
}

/// cpal-based audio source implementation
pub struct CpalSource {
    config: AudioConfig,
    cmd_tx: Option<std::sync::mpsc::Sender<CaptureCommand>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl CpalSource {
    pub fn new(config: &AudioConfig) -> Result<Self, AudioError> {
        Ok(Self {
            config: config.clone(),
            cmd_tx: None,
            thread_handle: None,
        })
    }
}

/// Find an audio input device by name with flexible matching:
/// exact, then case-insensitive, then substring.
fn find_audio_device(host: &cpal::Host, device_name: &str) -> Result<cpal::Device, AudioError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| AudioError::Connection(e.to_string()))?
        .collect();

    let device_names: Vec<String> = devices.iter().filter_map(|d| d.name().ok()).collect();
    let search_lower = device_name.to_lowercase();

    let matched_name = device_names
        .iter()
        .find(|n| n.as_str() == device_name)
        .or_else(|| {
            device_names
                .iter()
                .find(|n| n.to_lowercase() == search_lower)
        })
        .or_else(|| {
            device_names
                .iter()
                .find(|n| n.to_lowercase().contains(&search_lower))
        })
        .cloned();

    if let Some(name) = matched_name {
        tracing::debug!("Matched audio device: {} (searched for: {})", name, device_name);
        return host
            .input_devices()
            .map_err(|e| AudioError::Connection(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(device_name.to_string()));
    }

    let available = if device_names.is_empty() {
        "No audio input devices found.".to_string()
    } else {
        format!(
            "Available devices:\n{}",
            device_names
                .iter()
                .map(|n| format!("  - {}", n))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    Err(AudioError::DeviceNotFoundWithList {
        requested: device_name.to_string(),
        available,
    })
}

#[async_trait::async_trait]
impl AudioSource for CpalSource {
    async fn open(&mut self) -> Result<mpsc::Receiver<SourceEvent>, AudioError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();

        let device = if self.config.device == "default" {
            host.default_input_device()
                .ok_or_else(|| AudioError::DeviceNotFound("default".to_string()))?
        } else {
            find_audio_device(&host, &self.config.device)?
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Using audio device: {}", device_name);

        let supported_config = device
            .default_input_config()
            .map_err(|e| AudioError::Connection(e.to_string()))?;

        let source_rate = supported_config.sample_rate().0;
        let source_channels = supported_config.channels() as usize;
        let sample_format = supported_config.sample_format();

        tracing::debug!(
            "Device config: {} Hz, {} channel(s), format: {:?}",
            source_rate,
            source_channels,
            sample_format
        );

        let (event_tx, event_rx) = mpsc::channel(self.config.queue_depth);
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<CaptureCommand>();

        let assembler = Arc::new(Mutex::new(Assembler {
            pending: Vec::new(),
            block_size: self.config.block_size,
            next_seq: 0,
            stats: SourceStats::default(),
            tx: event_tx.clone(),
        }));
        let assembler_thread = assembler.clone();

        let target_rate = self.config.sample_rate;
        let err_tx = event_tx.clone();
        let (open_tx, open_rx) = oneshot::channel::<Result<(), AudioError>>();

        let thread_handle = thread::spawn(move || {
            let stream_config = cpal::StreamConfig {
                channels: supported_config.channels(),
                sample_rate: supported_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            // Stream errors are terminal; forward one to the consumer
            let err_fn = move |err: cpal::StreamError| {
                tracing::error!("Audio stream error: {}", err);
                let _ = err_tx.try_send(SourceEvent::Failed(AudioError::Stream(err.to_string())));
            };

            let params = StreamBuildParams {
                assembler: assembler_thread.clone(),
                source_rate,
                target_rate,
                source_channels,
            };

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, params, err_fn),
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, params, err_fn),
                cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, params, err_fn),
                format => Err(AudioError::Stream(format!(
                    "Unsupported sample format: {:?}",
                    format
                ))),
            };

            let stream = match stream_result {
                Ok(s) => s,
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = open_tx.send(Err(AudioError::Stream(e.to_string())));
                return;
            }

            let _ = open_tx.send(Ok(()));
            tracing::debug!("Audio capture thread started");

            if let Ok(CaptureCommand::Stop(response_tx)) = cmd_rx.recv() {
                drop(stream);

                let stats = {
                    let mut guard = match assembler_thread.lock() {
                        Ok(g) => g,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    guard.flush();
                    guard.stats
                };

                let _ = response_tx.send(stats);
            }

            tracing::debug!("Audio capture thread stopped");
        });

        // Wait for the stream to actually start before reporting success
        match open_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(AudioError::Stream(
                    "Capture thread exited during startup".to_string(),
                ));
            }
        }

        self.cmd_tx = Some(cmd_tx);
        self.thread_handle = Some(thread_handle);

        Ok(event_rx)
    }

    async fn close(&mut self) -> Result<SourceStats, AudioError> {
        let stats = if let Some(cmd_tx) = self.cmd_tx.take() {
            let (response_tx, response_rx) = oneshot::channel();

            if cmd_tx.send(CaptureCommand::Stop(response_tx)).is_ok() {
                match tokio::time::timeout(std::time::Duration::from_secs(2), response_rx).await {
                    Ok(Ok(stats)) => stats,
                    Ok(Err(_)) => return Err(AudioError::Stream("Channel closed".to_string())),
                    Err(_) => return Err(AudioError::Timeout(2)),
                }
            } else {
                SourceStats::default()
            }
        } else {
            SourceStats::default()
        };

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        tracing::debug!(
            "Audio source closed: {} blocks sent, {} dropped",
            stats.blocks_sent,
            stats.blocks_dropped
        );

        Ok(stats)
    }
}

/// Parameters for building an audio input stream
struct StreamBuildParams {
    assembler: Arc<Mutex<Assembler>>,
    source_rate: u32,
    target_rate: u32,
    source_channels: usize,
}

/// Build an input stream for a specific sample type
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    params: StreamBuildParams,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let StreamBuildParams {
        assembler,
        source_rate,
        target_rate,
        source_channels,
    } = params;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Convert to f32 and mix to mono
                let mono_f32: Vec<f32> = data
                    .chunks(source_channels)
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / source_channels as f32
                    })
                    .collect();

                let resampled = if source_rate != target_rate {
                    super::resample(&mono_f32, source_rate, target_rate)
                } else {
                    mono_f32
                };

                if let Ok(mut guard) = assembler.lock() {
                    guard.push(&resampled);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))?;

    Ok(stream)
}
