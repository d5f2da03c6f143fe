//! evdev-based hotkey watcher
//!
//! Uses the Linux evdev interface to detect key presses at the kernel
//! level. This works on all Wayland compositors because it bypasses the
//! display server.
//!
//! The watcher loop polls devices in non-blocking mode. If every device
//! dies (USB keyboard unplugged, hook revoked), it re-enumerates
//! /dev/input on a backoff schedule rather than exiting, so a replugged
//! keyboard resumes working without a daemon restart.
//!
//! The user must be in the 'input' group to access /dev/input/* devices.

use super::{Debouncer, HotkeyEvent, HotkeyWatcher};
use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use evdev::{Device, InputEventKind, Key};
use std::collections::HashSet;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// Longest pause between device re-enumeration attempts
const REDISCOVER_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// evdev-based hotkey watcher
pub struct EvdevWatcher {
    /// The key to listen for
    target_key: Key,
    /// Modifier keys that must be held
    modifier_keys: HashSet<Key>,
    /// Debounce window for press/release bounce
    debounce: Duration,
    /// Signal to stop the watcher task
    stop_signal: Option<oneshot::Sender<()>>,
}

impl EvdevWatcher {
    /// Create a new evdev watcher for the configured hotkey
    pub fn new(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        let target_key = parse_key_name(&config.key)?;

        let modifier_keys = config
            .modifiers
            .iter()
            .map(|k| parse_key_name(k))
            .collect::<Result<HashSet<_>, _>>()?;

        // Fail at startup if no keyboard is reachable; later losses are
        // handled by re-enumeration inside the loop
        let device_paths = find_keyboard_devices()?;
        if device_paths.is_empty() {
            return Err(HotkeyError::NoKeyboard);
        }

        tracing::debug!(
            "Found {} keyboard device(s): {:?}",
            device_paths.len(),
            device_paths
        );

        Ok(Self {
            target_key,
            modifier_keys,
            debounce: Duration::from_millis(config.debounce_ms),
            stop_signal: None,
        })
    }
}

#[async_trait::async_trait]
impl HotkeyWatcher for EvdevWatcher {
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError> {
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);

        let target_key = self.target_key;
        let modifier_keys = self.modifier_keys.clone();
        let debounce = self.debounce;

        tokio::task::spawn_blocking(move || {
            watcher_loop(target_key, modifier_keys, debounce, tx, stop_rx);
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
        Ok(())
    }
}

/// Open all known keyboard devices in non-blocking mode
fn open_devices() -> Vec<Device> {
    let paths = match find_keyboard_devices() {
        Ok(paths) => paths,
        Err(e) => {
            tracing::warn!("Keyboard enumeration failed: {}", e);
            return Vec::new();
        }
    };

    paths
        .iter()
        .filter_map(|path| match Device::open(path) {
            Ok(device) => {
                let fd = device.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFL);
                    if flags != -1 {
                        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                    }
                }
                tracing::debug!("Opened device (non-blocking): {:?}", path);
                Some(device)
            }
            Err(e) => {
                tracing::warn!("Failed to open {:?}: {}", path, e);
                None
            }
        })
        .collect()
}

/// Main watcher loop running in a blocking task
fn watcher_loop(
    target_key: Key,
    modifier_keys: HashSet<Key>,
    debounce: Duration,
    tx: mpsc::Sender<HotkeyEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut devices = open_devices();
    let mut rediscover_backoff = Duration::from_millis(500);

    // Track currently held modifier keys
    let mut active_modifiers: HashSet<Key> = HashSet::new();

    // Track press state to filter key-repeat events
    let mut is_pressed = false;

    let mut debouncer = Debouncer::new(debounce);

    tracing::info!(
        "Watching for {:?} (with modifiers: {:?})",
        target_key,
        modifier_keys
    );

    loop {
        // Check for stop signal (non-blocking)
        match stop_rx.try_recv() {
            Ok(_) | Err(oneshot::error::TryRecvError::Closed) => {
                tracing::debug!("Hotkey watcher stopping");
                return;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
        }

        // All devices gone: re-enumerate with backoff instead of dying
        if devices.is_empty() {
            tracing::warn!(
                "No input devices available, retrying in {:.1}s",
                rediscover_backoff.as_secs_f32()
            );
            std::thread::sleep(rediscover_backoff);
            rediscover_backoff = (rediscover_backoff * 2).min(REDISCOVER_MAX_BACKOFF);
            devices = open_devices();
            continue;
        }
        rediscover_backoff = Duration::from_millis(500);

        let mut dead = Vec::new();
        for (idx, device) in devices.iter_mut().enumerate() {
            // fetch_events returns immediately if no events
            match device.fetch_events() {
                Ok(events) => {
                    for event in events {
                        if let InputEventKind::Key(key) = event.kind() {
                            let value = event.value();

                            if modifier_keys.contains(&key) {
                                match value {
                                    1 => {
                                        active_modifiers.insert(key);
                                    }
                                    0 => {
                                        active_modifiers.remove(&key);
                                    }
                                    _ => {}
                                }
                            }

                            if key == target_key {
                                let modifiers_satisfied =
                                    modifier_keys.iter().all(|m| active_modifiers.contains(m));

                                if modifiers_satisfied {
                                    match value {
                                        1 if !is_pressed => {
                                            if !debouncer.accept(Instant::now()) {
                                                tracing::trace!("Debounced press");
                                                continue;
                                            }
                                            is_pressed = true;
                                            tracing::debug!("Hotkey pressed");
                                            if tx.blocking_send(HotkeyEvent::Pressed).is_err() {
                                                return; // Channel closed
                                            }
                                        }
                                        0 if is_pressed => {
                                            if !debouncer.accept(Instant::now()) {
                                                tracing::trace!("Debounced release");
                                                continue;
                                            }
                                            is_pressed = false;
                                            tracing::debug!("Hotkey released");
                                            if tx.blocking_send(HotkeyEvent::Released).is_err() {
                                                return;
                                            }
                                        }
                                        2 => {
                                            // Key repeat - ignore
                                        }
                                        _ => {}
                                    }
                                }
                            }
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    // Device unplugged or hook revoked
                    tracing::warn!("Input device lost: {}", e);
                    dead.push(idx);
                }
            }
        }

        for idx in dead.into_iter().rev() {
            devices.swap_remove(idx);
        }

        // Small sleep to avoid busy-waiting
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Find all keyboard input devices
fn find_keyboard_devices() -> Result<Vec<PathBuf>, HotkeyError> {
    let mut keyboards = Vec::new();

    let input_dir = std::fs::read_dir("/dev/input")
        .map_err(|e| HotkeyError::DeviceAccess(format!("/dev/input: {}", e)))?;

    for entry in input_dir {
        let entry = entry.map_err(|e| HotkeyError::DeviceAccess(e.to_string()))?;
        let path = entry.path();

        let is_event_device = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false);

        if !is_event_device {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => {
                // A keyboard should have at least some letter keys
                let has_keys = device
                    .supported_keys()
                    .map(|keys| {
                        keys.contains(Key::KEY_A)
                            && keys.contains(Key::KEY_Z)
                            && keys.contains(Key::KEY_ENTER)
                    })
                    .unwrap_or(false);

                if has_keys {
                    tracing::debug!(
                        "Found keyboard: {:?} ({:?})",
                        path,
                        device.name().unwrap_or("unknown")
                    );
                    keyboards.push(path);
                }
            }
            Err(e) => {
                // Permission denied is common for non-input-group users
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    return Err(HotkeyError::DeviceAccess(path.display().to_string()));
                }
                tracing::trace!("Skipping {:?}: {}", path, e);
            }
        }
    }

    Ok(keyboards)
}

/// Parse a key name string to an evdev Key
fn parse_key_name(name: &str) -> Result<Key, HotkeyError> {
    // Normalize: uppercase and replace - or space with _
    let normalized: String = name
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();

    let key_name = if normalized.starts_with("KEY_") {
        normalized
    } else {
        format!("KEY_{}", normalized)
    };

    let key = match key_name.as_str() {
        // Lock keys (good hotkey candidates)
        "KEY_SCROLLLOCK" => Key::KEY_SCROLLLOCK,
        "KEY_PAUSE" => Key::KEY_PAUSE,
        "KEY_CAPSLOCK" => Key::KEY_CAPSLOCK,
        "KEY_NUMLOCK" => Key::KEY_NUMLOCK,
        "KEY_INSERT" => Key::KEY_INSERT,

        // Modifier keys
        "KEY_LEFTALT" | "KEY_LALT" => Key::KEY_LEFTALT,
        "KEY_RIGHTALT" | "KEY_RALT" => Key::KEY_RIGHTALT,
        "KEY_LEFTCTRL" | "KEY_LCTRL" => Key::KEY_LEFTCTRL,
        "KEY_RIGHTCTRL" | "KEY_RCTRL" => Key::KEY_RIGHTCTRL,
        "KEY_LEFTSHIFT" | "KEY_LSHIFT" => Key::KEY_LEFTSHIFT,
        "KEY_RIGHTSHIFT" | "KEY_RSHIFT" => Key::KEY_RIGHTSHIFT,
        "KEY_LEFTMETA" | "KEY_LMETA" | "KEY_SUPER" => Key::KEY_LEFTMETA,
        "KEY_RIGHTMETA" | "KEY_RMETA" => Key::KEY_RIGHTMETA,

        // Function keys (F13-F24 are often unused and make good hotkeys)
        "KEY_F1" => Key::KEY_F1,
        "KEY_F2" => Key::KEY_F2,
        "KEY_F3" => Key::KEY_F3,
        "KEY_F4" => Key::KEY_F4,
        "KEY_F5" => Key::KEY_F5,
        "KEY_F6" => Key::KEY_F6,
        "KEY_F7" => Key::KEY_F7,
        "KEY_F8" => Key::KEY_F8,
        "KEY_F9" => Key::KEY_F9,
        "KEY_F10" => Key::KEY_F10,
        "KEY_F11" => Key::KEY_F11,
        "KEY_F12" => Key::KEY_F12,
        "KEY_F13" => Key::KEY_F13,
        "KEY_F14" => Key::KEY_F14,
        "KEY_F15" => Key::KEY_F15,
        "KEY_F16" => Key::KEY_F16,
        "KEY_F17" => Key::KEY_F17,
        "KEY_F18" => Key::KEY_F18,
        "KEY_F19" => Key::KEY_F19,
        "KEY_F20" => Key::KEY_F20,
        "KEY_F21" => Key::KEY_F21,
        "KEY_F22" => Key::KEY_F22,
        "KEY_F23" => Key::KEY_F23,
        "KEY_F24" => Key::KEY_F24,

        // Navigation keys
        "KEY_HOME" => Key::KEY_HOME,
        "KEY_END" => Key::KEY_END,
        "KEY_PAGEUP" => Key::KEY_PAGEUP,
        "KEY_PAGEDOWN" => Key::KEY_PAGEDOWN,
        "KEY_DELETE" => Key::KEY_DELETE,

        // Common keys that might be used
        "KEY_SPACE" => Key::KEY_SPACE,
        "KEY_ENTER" => Key::KEY_ENTER,
        "KEY_TAB" => Key::KEY_TAB,
        "KEY_BACKSPACE" => Key::KEY_BACKSPACE,
        "KEY_ESC" | "KEY_ESCAPE" => Key::KEY_ESC,
        "KEY_GRAVE" | "KEY_BACKTICK" => Key::KEY_GRAVE,

        // Media keys
        "KEY_MUTE" => Key::KEY_MUTE,
        "KEY_VOLUMEDOWN" => Key::KEY_VOLUMEDOWN,
        "KEY_VOLUMEUP" => Key::KEY_VOLUMEUP,
        "KEY_PLAYPAUSE" => Key::KEY_PLAYPAUSE,

        _ => {
            return Err(HotkeyError::UnknownKey(format!(
                "{}. Try: SCROLLLOCK, PAUSE, F13-F24, or run 'evtest' to find key names",
                name
            )));
        }
    };

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_name() {
        assert_eq!(parse_key_name("SCROLLLOCK").unwrap(), Key::KEY_SCROLLLOCK);
        assert_eq!(parse_key_name("ScrollLock").unwrap(), Key::KEY_SCROLLLOCK);
        assert_eq!(
            parse_key_name("KEY_SCROLLLOCK").unwrap(),
            Key::KEY_SCROLLLOCK
        );
        assert_eq!(parse_key_name("F13").unwrap(), Key::KEY_F13);
        assert_eq!(parse_key_name("LEFTALT").unwrap(), Key::KEY_LEFTALT);
        assert_eq!(parse_key_name("LALT").unwrap(), Key::KEY_LEFTALT);
    }

    #[test]
    fn test_parse_key_name_error() {
        assert!(parse_key_name("INVALID_KEY_NAME").is_err());
    }
}
