//! Error types for holdtype
//!
//! Uses thiserror for ergonomic error definitions. The taxonomy follows
//! the recovery boundaries of the pipeline: anything tied to a single
//! recording session is recoverable and aborts only that session; engine
//! lifecycle failures put the pipeline into degraded mode; invariant
//! violations are fatal to the coordinator.

use thiserror::Error;

/// Top-level error type for the holdtype application
#[derive(Error, Debug)]
pub enum HoldtypeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("Audio capture error: {0}")]
    Audio(#[from] AudioError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Output error: {0}")]
    Sink(#[from] SinkError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to hotkey detection
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("Cannot open input device '{0}'. Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    DeviceAccess(String),

    #[error("Unknown key name: '{0}'. Use evtest or wev to find valid key names.")]
    UnknownKey(String),

    #[error("No keyboard device found in /dev/input/")]
    NoKeyboard,

    #[error("Hotkey detection is not supported on this platform: {0}")]
    NotSupported(String),
}

/// Errors related to audio capture
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio connection failed: {0}")]
    Connection(String),

    #[error("Audio device not found: '{0}'. List devices with: pactl list sources short")]
    DeviceNotFound(String),

    #[error("Audio device not found: '{requested}'.\n{available}")]
    DeviceNotFoundWithList { requested: String, available: String },

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Timed out waiting for the capture thread ({0}s)")]
    Timeout(u32),
}

/// Errors related to the speech-to-text engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Engine initialization failed: {0}")]
    Load(String),

    #[error("Inference failed: {0}")]
    Runtime(String),

    #[error("Engine is not ready")]
    NotReady,
}

/// Errors related to text delivery (typing / clipboard)
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("wtype not found in PATH. Install via your package manager.")]
    WtypeNotFound,

    #[error("wl-copy not found in PATH. Install wl-clipboard via your package manager.")]
    WlCopyNotFound,

    #[error("Text injection failed: {0}")]
    InjectionFailed(String),

    #[error("All output methods failed. Ensure wtype or wl-copy is available.")]
    AllMethodsFailed,
}

/// Errors owned by the pipeline coordinator itself
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A structural invariant was broken (e.g. two concurrent recording
    /// sessions). The coordinator must stop rather than continue with
    /// corrupted state.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("event channel closed: {0}")]
    ChannelClosed(&'static str),
}

/// Result type alias using HoldtypeError
pub type Result<T> = std::result::Result<T, HoldtypeError>;
