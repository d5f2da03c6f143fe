//! Clipboard-based text delivery
//!
//! Uses wl-copy to place text on the Wayland clipboard. Works on every
//! compositor, which makes it the last rung of the fallback chain.
//!
//! Requires: wl-clipboard package installed

use super::TextSink;
use crate::error::SinkError;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Clipboard sink
pub struct ClipboardSink {
    /// Whether to show a desktop notification after delivery
    notify: bool,
}

impl ClipboardSink {
    pub fn new(notify: bool) -> Self {
        Self { notify }
    }

    /// Send a desktop notification with a truncated preview
    async fn send_notification(&self, text: &str) {
        let preview = if text.chars().count() > 80 {
            format!("{}...", text.chars().take(80).collect::<String>())
        } else {
            text.to_string()
        };

        let _ = Command::new("notify-send")
            .args([
                "--app-name=Holdtype",
                "--urgency=low",
                "--expire-time=3000",
                "Copied to clipboard",
                &preview,
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }
}

#[async_trait::async_trait]
impl TextSink for ClipboardSink {
    async fn deliver(&self, text: &str) -> Result<(), SinkError> {
        if text.is_empty() {
            return Ok(());
        }

        let mut child = Command::new("wl-copy")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SinkError::WlCopyNotFound
                } else {
                    SinkError::InjectionFailed(e.to_string())
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| SinkError::InjectionFailed(e.to_string()))?;
            // EOF lets wl-copy take ownership of the selection
            drop(stdin);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| SinkError::InjectionFailed(e.to_string()))?;

        if !status.success() {
            return Err(SinkError::InjectionFailed(
                "wl-copy exited with error".to_string(),
            ));
        }

        if self.notify {
            self.send_notification(text).await;
        }

        tracing::info!("Text copied to clipboard ({} chars)", text.len());
        Ok(())
    }

    async fn is_available(&self) -> bool {
        Command::new("which")
            .arg("wl-copy")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "clipboard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let sink = ClipboardSink::new(true);
        assert!(sink.notify);
        let sink = ClipboardSink::new(false);
        assert!(!sink.notify);
    }
}
