//! Speech-to-text engine module
//!
//! The engine is treated as a black box: a [`SpeechEngine`] accepts a
//! block of mono PCM at the expected sample rate and returns text with
//! a confidence score. Model loading is separated into [`EngineLoader`]
//! so the coordinator can retry a failed load on a backoff schedule
//! without rebuilding the pipeline.
//!
//! Engines are not reentrant; the coordinator never runs two
//! transcribe calls against the same instance concurrently.

pub mod whisper;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::session::SessionId;
use std::sync::Arc;

/// Sample rate the whisper backend expects. Resampling to this rate
/// happens in the audio source, never inside the engine.
pub const ENGINE_SAMPLE_RATE: u32 = 16000;

/// Lifecycle of the engine slot, tracked by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    Busy,
    Failed,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
            EngineState::Busy => "busy",
            EngineState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Raw engine output for one inference call
#[derive(Debug, Clone)]
pub struct EngineOutput {
    /// Transcribed text; empty for silence-only input
    pub text: String,
    /// Heuristic confidence in [0, 1]
    pub confidence: f32,
    /// Language code of the transcription
    pub language: String,
}

/// Final, caller-visible result for one completed session
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    pub session_id: SessionId,
    /// Validated Unicode; never re-encoded or truncated downstream
    pub text: String,
    /// Duration of the transcribed audio in seconds
    pub duration_secs: f32,
    /// Heuristic confidence in [0, 1]
    pub confidence: f32,
    /// Language code
    pub language: String,
}

/// Trait for blocking speech-to-text implementations.
/// Input: f32 samples, mono, at [`ENGINE_SAMPLE_RATE`].
pub trait SpeechEngine: Send + Sync {
    fn transcribe(&self, samples: &[f32]) -> Result<EngineOutput, EngineError>;
}

/// Loads an engine instance. Loading takes seconds and can fail on a
/// missing or corrupt model; the coordinator owns the retry policy.
pub trait EngineLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn SpeechEngine>, EngineError>;
}

/// whisper-rs loader used by the daemon
pub struct WhisperLoader {
    config: EngineConfig,
}

impl WhisperLoader {
    pub fn new(config: &EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            config: config.clone(),
        })
    }
}

impl EngineLoader for WhisperLoader {
    fn load(&self) -> Result<Box<dyn SpeechEngine>, EngineError> {
        Ok(Box::new(whisper::WhisperEngine::new(&self.config)?))
    }
}

/// True when the capture contains no usable signal. Silence short-
/// circuits to an empty result so "nothing was said" is never reported
/// as an engine failure.
pub fn is_silence(samples: &[f32]) -> bool {
    const SILENCE_PEAK: f32 = 1e-4;
    samples.iter().all(|s| s.abs() < SILENCE_PEAK)
}
