//! Configuration loading and types for holdtype
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/holdtype/config.toml)
//! 3. Environment variables (HOLDTYPE_*)
//! 4. CLI arguments (highest priority)

use crate::error::HoldtypeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Holdtype Configuration
#
# Location: ~/.config/holdtype/config.toml
# All settings can be overridden via CLI flags

# State file for external integrations (Waybar, polybar, etc.)
# Use "auto" for default location ($XDG_RUNTIME_DIR/holdtype/state),
# a custom path, or "disabled" to turn off. The daemon writes state
# ("idle", "recording", "transcribing") to this file whenever it changes.
state_file = "auto"

[hotkey]
# Key to hold for push-to-talk
# Common choices: SCROLLLOCK, PAUSE, RIGHTALT, F13-F24
# Use `evtest` to find key names for your keyboard
key = "SCROLLLOCK"

# Optional modifier keys that must also be held
# Example: modifiers = ["LEFTCTRL", "LEFTALT"]
modifiers = []

# Activation mode: "push_to_talk" or "toggle"
# - push_to_talk: Hold hotkey to record, release to transcribe (default)
# - toggle: Press hotkey once to start recording, press again to stop
# mode = "push_to_talk"

# Minimum gap between emitted key events in milliseconds. Filters the
# bounce some keyboards produce on rapid press/release.
# debounce_ms = 25

# Enable built-in hotkey detection (default: true)
# Set to false when using compositor keybindings (Hyprland, Sway) instead;
# control recording with `holdtype record start/stop/toggle`
# enabled = true

[audio]
# Audio input device ("default" uses system default)
# List devices with: pactl list sources short
device = "default"

# Sample rate in Hz delivered to the engine (whisper expects 16000)
sample_rate = 16000

# Samples per audio block handed from the device to the session.
# 1600 samples at 16kHz is one block every 100ms.
block_size = 1600

# Bounded handoff queue between the device callback and the session.
# When full, blocks are dropped and recorded as a gap on the session.
queue_depth = 64

# Maximum recording duration in seconds (safety limit).
# A runaway recording is force-finalized at this point.
max_duration_secs = 60

[engine]
# Model to use for transcription
# Options: tiny, tiny.en, base, base.en, small, small.en, medium, medium.en, large-v3, large-v3-turbo
# Or provide an absolute path to a custom .bin model file
model = "base.en"

# Language for transcription ("en", "auto", ...)
language = "en"

# Translate non-English speech to English
translate = false

# Number of CPU threads for inference (omit for auto-detection)
# threads = 4

# Consecutive inference failures before the engine is taken out of
# service and reloaded on a backoff schedule.
# failure_threshold = 3

[pipeline]
# Captures shorter than this are discarded without invoking the engine
# (filters accidental taps of the hotkey).
min_duration_ms = 150

# What a hotkey press during an active recording does:
# - "ignore": drop the trigger (default)
# - "queue": start a new recording immediately after the current one ends
overlap_policy = "ignore"

# What happens when a recording completes while the engine is still
# busy with the previous one:
# - "wait": queue the new capture and transcribe it next (default)
# - "drop_and_warn": discard the in-flight result, transcribe the new capture
backpressure = "wait"

# Dropped device blocks tolerated before a capture is rejected as gapped.
# gap_tolerance_blocks = 2

[output]
# Primary output mode: "type" or "clipboard"
# - type: Simulates keyboard input at cursor position (requires wtype)
# - clipboard: Copies text to clipboard (requires wl-copy)
mode = "type"

# Fall back to clipboard if typing fails
fallback_to_clipboard = true

[output.notification]
# Show notification with transcribed text after transcription completes
on_transcription = true
"#;

/// Hotkey activation mode
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Hold key to record, release to stop (default)
    #[default]
    PushToTalk,
    /// Press once to start recording, press again to stop
    Toggle,
}

/// Policy for a trigger press that arrives while a session is recording
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Drop the trigger (default)
    #[default]
    Ignore,
    /// Remember it and start a new session as soon as the current one ends
    Queue,
}

/// Policy for a capture that completes while the engine is busy
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Queue the new capture behind the in-flight one (default)
    #[default]
    Wait,
    /// Let the in-flight job finish but discard its result, then
    /// transcribe the new capture
    DropAndWarn,
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub hotkey: HotkeyConfig,
    pub audio: AudioConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,

    /// Optional path to state file for external integrations (e.g. Waybar).
    /// "auto" resolves to $XDG_RUNTIME_DIR/holdtype/state.
    #[serde(default)]
    pub state_file: Option<String>,
}

/// Hotkey detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotkeyConfig {
    /// Key name (evdev KEY_* constant name, without the KEY_ prefix)
    /// Examples: "SCROLLLOCK", "RIGHTALT", "PAUSE", "F24"
    #[serde(default = "default_hotkey_key")]
    pub key: String,

    /// Optional modifier keys that must also be held
    #[serde(default)]
    pub modifiers: Vec<String>,

    /// Activation mode: push_to_talk (hold to record) or toggle
    #[serde(default)]
    pub mode: ActivationMode,

    /// Minimum gap between emitted events in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Enable built-in hotkey detection (default: true).
    /// When disabled, use `holdtype record start/stop/toggle` instead.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Audio capture configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// PipeWire/PulseAudio device name, or "default"
    pub device: String,

    /// Sample rate in Hz delivered downstream (whisper expects 16000)
    pub sample_rate: u32,

    /// Samples per block handed from the device callback to the session
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Bounded handoff queue depth between callback and consumer
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Maximum recording duration in seconds (safety limit)
    pub max_duration_secs: u32,
}

/// Speech-to-text engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Model name: tiny, base, small, medium, large-v3, large-v3-turbo
    /// Can also be an absolute path to a .bin file
    pub model: String,

    /// Language code (en, es, fr, auto, etc.)
    pub language: String,

    /// Translate to English if source language is not English
    #[serde(default)]
    pub translate: bool,

    /// Number of threads for inference (None = auto-detect)
    pub threads: Option<usize>,

    /// Consecutive inference failures before the engine is reloaded
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Initial reload backoff in milliseconds after a load failure
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    /// Maximum reload backoff in milliseconds
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// How long shutdown waits for an in-flight transcription, in seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

/// Coordinator behavior configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Captures shorter than this never reach the engine
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,

    /// Trigger press during an active recording: ignore or queue
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,

    /// Capture completed while the engine is busy: wait or drop_and_warn
    #[serde(default)]
    pub backpressure: BackpressurePolicy,

    /// Dropped blocks tolerated before a capture is rejected as gapped
    #[serde(default = "default_gap_tolerance")]
    pub gap_tolerance_blocks: u64,

    /// Capacity of the subscriber event ring; lagging subscribers lose
    /// the oldest events
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: default_min_duration_ms(),
            overlap_policy: OverlapPolicy::default(),
            backpressure: BackpressurePolicy::default(),
            gap_tolerance_blocks: default_gap_tolerance(),
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Notify with transcribed text after transcription completes
    #[serde(default = "default_true")]
    pub on_transcription: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_transcription: true,
        }
    }
}

/// Text output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Primary output mode
    pub mode: OutputMode,

    /// Fall back to clipboard if typing fails
    #[serde(default = "default_true")]
    pub fallback_to_clipboard: bool,

    /// Notification settings
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::Type,
            fallback_to_clipboard: true,
            notification: NotificationConfig::default(),
        }
    }
}

/// Output mode selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Simulate keyboard input (requires wtype)
    Type,
    /// Copy to clipboard (requires wl-copy)
    Clipboard,
}

fn default_hotkey_key() -> String {
    "SCROLLLOCK".to_string()
}

fn default_debounce_ms() -> u64 {
    25
}

fn default_block_size() -> usize {
    1600
}

fn default_queue_depth() -> usize {
    64
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_retry_initial_ms() -> u64 {
    1000
}

fn default_retry_max_ms() -> u64 {
    30_000
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_min_duration_ms() -> u64 {
    150
}

fn default_gap_tolerance() -> u64 {
    2
}

fn default_event_queue_depth() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: HotkeyConfig {
                key: default_hotkey_key(),
                modifiers: vec![],
                mode: ActivationMode::default(),
                debounce_ms: default_debounce_ms(),
                enabled: true,
            },
            audio: AudioConfig {
                device: "default".to_string(),
                sample_rate: 16000,
                block_size: default_block_size(),
                queue_depth: default_queue_depth(),
                max_duration_secs: 60,
            },
            engine: EngineConfig {
                model: "base.en".to_string(),
                language: "en".to_string(),
                translate: false,
                threads: None,
                failure_threshold: default_failure_threshold(),
                retry_initial_ms: default_retry_initial_ms(),
                retry_max_ms: default_retry_max_ms(),
                shutdown_timeout_secs: default_shutdown_timeout_secs(),
            },
            pipeline: PipelineConfig::default(),
            output: OutputConfig::default(),
            state_file: Some("auto".to_string()),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "holdtype")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the runtime directory for ephemeral files (state, pid)
    pub fn runtime_dir() -> PathBuf {
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join("holdtype")
    }

    /// Resolve the state file path from config.
    /// Returns None if disabled, the resolved path for "auto" or an
    /// explicit path otherwise.
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        self.state_file.as_ref().and_then(|path| {
            match path.to_lowercase().as_str() {
                "disabled" | "none" | "off" | "false" => None,
                "auto" => Some(Self::runtime_dir().join("state")),
                _ => Some(PathBuf::from(path)),
            }
        })
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "holdtype")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the data directory path (for models)
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "holdtype")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the models directory path
    pub fn models_dir() -> PathBuf {
        Self::data_dir().join("models")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories() -> std::io::Result<()> {
        if let Some(config_dir) = Self::config_dir() {
            std::fs::create_dir_all(&config_dir)?;
            tracing::debug!("Ensured config directory exists: {:?}", config_dir);
        }

        let models_dir = Self::models_dir();
        std::fs::create_dir_all(&models_dir)?;
        tracing::debug!("Ensured models directory exists: {:?}", models_dir);

        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, HoldtypeError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| HoldtypeError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| HoldtypeError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Override from environment variables
    if let Ok(key) = std::env::var("HOLDTYPE_HOTKEY") {
        config.hotkey.key = key;
    }
    if let Ok(model) = std::env::var("HOLDTYPE_MODEL") {
        config.engine.model = model;
    }
    if let Ok(mode) = std::env::var("HOLDTYPE_OUTPUT_MODE") {
        config.output.mode = match mode.to_lowercase().as_str() {
            "clipboard" => OutputMode::Clipboard,
            _ => OutputMode::Type,
        };
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hotkey.key, "SCROLLLOCK");
        assert_eq!(config.hotkey.mode, ActivationMode::PushToTalk);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.block_size, 1600);
        assert_eq!(config.engine.model, "base.en");
        assert_eq!(config.pipeline.min_duration_ms, 150);
        assert_eq!(config.pipeline.overlap_policy, OverlapPolicy::Ignore);
        assert_eq!(config.pipeline.backpressure, BackpressurePolicy::Wait);
        assert_eq!(config.output.mode, OutputMode::Type);
    }

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.hotkey.key, "SCROLLLOCK");
        assert_eq!(config.pipeline.min_duration_ms, 150);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
            [hotkey]
            key = "PAUSE"
            modifiers = ["LEFTCTRL"]

            [audio]
            device = "default"
            sample_rate = 16000
            max_duration_secs = 30

            [engine]
            model = "small.en"
            language = "en"

            [pipeline]
            min_duration_ms = 200
            overlap_policy = "queue"
            backpressure = "drop_and_warn"

            [output]
            mode = "clipboard"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.hotkey.key, "PAUSE");
        assert_eq!(config.hotkey.modifiers, vec!["LEFTCTRL"]);
        assert_eq!(config.hotkey.mode, ActivationMode::PushToTalk); // default
        assert_eq!(config.engine.model, "small.en");
        assert_eq!(config.pipeline.min_duration_ms, 200);
        assert_eq!(config.pipeline.overlap_policy, OverlapPolicy::Queue);
        assert_eq!(
            config.pipeline.backpressure,
            BackpressurePolicy::DropAndWarn
        );
        assert_eq!(config.output.mode, OutputMode::Clipboard);
    }

    #[test]
    fn test_parse_hotkey_disabled_without_key() {
        // When hotkey is disabled, the key field should not be required
        let toml_str = r#"
            [hotkey]
            enabled = false

            [audio]
            device = "default"
            sample_rate = 16000
            max_duration_secs = 60

            [engine]
            model = "base.en"
            language = "en"

            [output]
            mode = "type"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(!config.hotkey.enabled);
        assert_eq!(config.hotkey.key, "SCROLLLOCK"); // defaults
        assert_eq!(config.pipeline.min_duration_ms, 150); // section omitted
    }

    #[test]
    fn test_parse_toggle_mode() {
        let toml_str = r#"
            [hotkey]
            key = "F13"
            mode = "toggle"
            debounce_ms = 50

            [audio]
            device = "default"
            sample_rate = 16000
            max_duration_secs = 60

            [engine]
            model = "base.en"
            language = "en"

            [output]
            mode = "type"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.hotkey.key, "F13");
        assert_eq!(config.hotkey.mode, ActivationMode::Toggle);
        assert_eq!(config.hotkey.debounce_ms, 50);
    }
}
