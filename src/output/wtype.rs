//! wtype-based keystroke injection
//!
//! Uses wtype to simulate keyboard input on Wayland. Preferred because
//! it needs no daemon and handles Unicode/CJK well.
//!
//! Requires wtype installed and a Wayland session.

use super::TextSink;
use crate::error::SinkError;
use std::process::Stdio;
use tokio::process::Command;

/// Keystroke injection sink
pub struct WtypeSink {
    /// Whether to show a desktop notification after delivery
    notify: bool,
}

impl WtypeSink {
    pub fn new(notify: bool) -> Self {
        Self { notify }
    }

    /// Send a desktop notification with a truncated preview
    async fn send_notification(&self, text: &str) {
        let preview: String = text.chars().take(100).collect();
        let preview = if text.chars().count() > 100 {
            format!("{}...", preview)
        } else {
            preview
        };

        let _ = Command::new("notify-send")
            .args([
                "--app-name=Holdtype",
                "--expire-time=3000",
                "Transcribed",
                &preview,
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }
}

#[async_trait::async_trait]
impl TextSink for WtypeSink {
    async fn deliver(&self, text: &str) -> Result<(), SinkError> {
        if text.is_empty() {
            return Ok(());
        }

        let output = Command::new("wtype")
            .arg("--")
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SinkError::WtypeNotFound
                } else {
                    SinkError::InjectionFailed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SinkError::InjectionFailed(format!(
                "wtype failed: {}",
                stderr
            )));
        }

        if self.notify {
            self.send_notification(text).await;
        }

        Ok(())
    }

    async fn is_available(&self) -> bool {
        // Only check PATH; wtype fails naturally without Wayland, and
        // systemd services may not carry WAYLAND_DISPLAY here
        Command::new("which")
            .arg("wtype")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "wtype"
    }
}
