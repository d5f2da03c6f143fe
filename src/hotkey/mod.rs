//! Hotkey detection module
//!
//! On Linux, provides kernel-level key event detection using evdev.
//! This approach works on all Wayland compositors because it operates
//! at the Linux input subsystem level.
//!
//! The watcher runs on its own blocking task so the OS input path is
//! never stalled by downstream work; events reach the coordinator over
//! a bounded channel. Rapid press/release bounce is filtered by a
//! configurable debounce window, and losing every input device triggers
//! re-enumeration with backoff instead of an exit.
//!
//! Linux: Requires the user to be in the 'input' group.

#[cfg(target_os = "linux")]
pub mod evdev_watcher;

use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Events emitted by the hotkey watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The hotkey was pressed
    Pressed,
    /// The hotkey was released
    Released,
}

/// Trait for hotkey watcher implementations
#[async_trait::async_trait]
pub trait HotkeyWatcher: Send + Sync {
    /// Start watching for hotkey events.
    /// Returns a channel receiver for events.
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError>;

    /// Stop watching and clean up
    async fn stop(&mut self) -> Result<(), HotkeyError>;
}

/// Suppresses events that follow the previous emitted event within the
/// debounce window. Keyboards with worn switches bounce on both edges.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_emit: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emit: None,
        }
    }

    /// Returns true if the event at `now` should be emitted
    pub fn accept(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(prev) if now.duration_since(prev) < self.window => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

/// Factory function to create the platform hotkey watcher
#[cfg(target_os = "linux")]
pub fn create_watcher(config: &HotkeyConfig) -> Result<Box<dyn HotkeyWatcher>, HotkeyError> {
    Ok(Box::new(evdev_watcher::EvdevWatcher::new(config)?))
}

/// Factory function to create the platform hotkey watcher
///
/// Not supported off Linux; use compositor keybindings with the
/// `holdtype record` commands instead.
#[cfg(not(target_os = "linux"))]
pub fn create_watcher(_config: &HotkeyConfig) -> Result<Box<dyn HotkeyWatcher>, HotkeyError> {
    Err(HotkeyError::NotSupported(
        "Built-in hotkey detection requires Linux evdev. \
         Use compositor keybindings with 'holdtype record start/stop' instead."
            .to_string(),
    ))
}
