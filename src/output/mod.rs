//! Text delivery module
//!
//! Delivers finished transcriptions to the focused application. Two
//! sinks exist: keystroke injection via wtype (Wayland) and the
//! clipboard via wl-copy. For `mode = "type"` the chain falls back to
//! the clipboard when injection is unavailable, so a transcription is
//! never dropped just because no compositor is reachable.

pub mod clipboard;
pub mod wtype;

use crate::config::{OutputConfig, OutputMode};
use crate::error::SinkError;

/// Trait for text delivery implementations
#[async_trait::async_trait]
pub trait TextSink: Send + Sync {
    /// Deliver text (type it or copy to clipboard)
    async fn deliver(&self, text: &str) -> Result<(), SinkError>;

    /// Check if this sink is usable right now
    async fn is_available(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Strip control characters that keystroke injection would misinterpret.
/// Newlines survive; everything else below 0x20 (and DEL) is dropped.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| *c == '\n' || !c.is_control())
        .collect()
}

/// Factory returning the fallback chain for the configured mode
pub fn create_sink_chain(config: &OutputConfig) -> Vec<Box<dyn TextSink>> {
    let mut chain: Vec<Box<dyn TextSink>> = Vec::new();

    match config.mode {
        OutputMode::Type => {
            chain.push(Box::new(wtype::WtypeSink::new(
                config.notification.on_transcription,
            )));
            if config.fallback_to_clipboard {
                chain.push(Box::new(clipboard::ClipboardSink::new(false)));
            }
        }
        OutputMode::Clipboard => {
            chain.push(Box::new(clipboard::ClipboardSink::new(
                config.notification.on_transcription,
            )));
        }
    }

    chain
}

/// Try each sink in the chain until one succeeds
pub async fn deliver_with_fallback(
    chain: &[Box<dyn TextSink>],
    text: &str,
) -> Result<(), SinkError> {
    for sink in chain {
        if !sink.is_available().await {
            tracing::debug!("{} not available, trying next", sink.name());
            continue;
        }

        match sink.deliver(text).await {
            Ok(()) => {
                tracing::debug!("Text delivered via {}", sink.name());
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("{} failed: {}, trying next", sink.name(), e);
            }
        }
    }

    Err(SinkError::AllMethodsFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_plain_text() {
        assert_eq!(sanitize("hello world"), "hello world");
    }

    #[test]
    fn test_sanitize_keeps_newlines() {
        assert_eq!(sanitize("line one\nline two"), "line one\nline two");
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize("a\u{7}b\tc\rd\u{7f}e"), "abcde");
    }

    #[test]
    fn test_sanitize_keeps_unicode() {
        assert_eq!(sanitize("日本語 ✓"), "日本語 ✓");
    }

    #[test]
    fn test_type_mode_chain_includes_clipboard_fallback() {
        let config = OutputConfig::default();
        let chain = create_sink_chain(&config);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name(), "wtype");
        assert_eq!(chain[1].name(), "clipboard");
    }

    #[test]
    fn test_clipboard_mode_chain_is_clipboard_only() {
        let config = OutputConfig {
            mode: OutputMode::Clipboard,
            ..OutputConfig::default()
        };
        let chain = create_sink_chain(&config);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name(), "clipboard");
    }
}
